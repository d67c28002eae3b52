// SPDX-License-Identifier: MIT OR Apache-2.0
//! Route handler modules, one per core route group (§6).

pub mod auth;
pub mod catalog;
pub mod chat;
pub mod composition;
pub mod import;
pub mod proposals;
