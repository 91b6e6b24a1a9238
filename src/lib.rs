//! # tsu-bind
//!
//! Request binding and response rendering for services built on [`http`]
//! and [`hyper`]. Bring your own router.
//!
//! ## Binding
//!
//! A [`Binder`] turns one part of a request (headers, cookies, the query
//! string, route parameters or the body) into a typed `serde` value.
//! Key/value sources understand bracketed keys (`posts[0][title]`), can split
//! comma-joined values into sequence fields, and honour kind-qualified names
//! such as `#[serde(rename = "query:page")]`. Bodies dispatch on their
//! `Content-Type` to JSON, XML, url-encoded form or multipart decoding.
//!
//! ## Rendering
//!
//! [`Render`] builds `http::Response` values: text, HTML, JSON, JSONP, XML,
//! downloads, redirects and server-sent events.
//!
//! ## Quick start
//!
//! ```rust,no_run
//! use http::Request;
//! use hyper::body::Incoming;
//! use serde::{Deserialize, Serialize};
//! use tsu_bind::{Binder, Render, render::Body};
//!
//! #[derive(Deserialize)]
//! struct NewUser {
//!     name: String,
//!     #[serde(default)]
//!     roles: Vec<String>,
//! }
//!
//! #[derive(Serialize)]
//! struct Created {
//!     id: u64,
//!     name: String,
//! }
//!
//! async fn create_user(binder: &Binder, req: Request<Incoming>) -> http::Response<Body> {
//!     let req = match tsu_bind::buffer(req).await {
//!         Ok(req) => req,
//!         Err(e) => return Render::new().status(e.status()).text(e.to_string()),
//!     };
//!     match binder.bind(&req).splitting(true).body::<NewUser>() {
//!         Ok(user) => Render::new()
//!             .status(http::StatusCode::CREATED)
//!             .json(&Created { id: 99, name: user.name }),
//!         Err(e) => Render::new().status(e.status()).text(e.to_string()),
//!     }
//! }
//! ```

mod binder;
mod config;
mod error;
mod kind;
mod request;

pub mod mime;
pub mod render;

pub use binder::{Bind, Binder, DEFAULT_MAX_MEMORY, FileFields, FileHeader, RawFields, normalize_key};
pub use config::{Converted, Converter, ParserConfig};
pub use error::{Error, Result};
pub use kind::BindKind;
pub use render::{ContentType, Render, sse};
pub use request::buffer;
