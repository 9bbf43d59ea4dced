#![doc = "git-bulk-core: size-aware bulk commit pipeline for remote git repositories."]

//! This crate holds the transport-agnostic logic of git-bulk: input validation,
//! chunk planning, client-side rate limiting, retry with backoff and the
//! commit pipeline that drives a remote object store through [`contract::GitDataClient`].
//!
//! # Usage
//! Build a [`push::PushContext`] around a shared [`ratelimit::RateLimiter`], then
//! call [`push::push_files_chunked`], [`push::push_files`] or
//! [`push::delete_files`] with any client implementation.

pub mod chunking;
pub mod contract;
pub mod error;
pub mod limits;
pub mod pipeline;
pub mod push;
pub mod ratelimit;
pub mod retry;
pub mod validation;
