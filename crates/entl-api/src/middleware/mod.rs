//! # Middleware Modules
//!
//! Tower middleware layers for the API service. Authentication lives in
//! [`crate::auth`] and the site/request-hook layer in
//! [`crate::request_context`].

pub mod metrics;
