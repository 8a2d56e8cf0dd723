#![forbid(unsafe_code)]

//! Core types for the APNs client workspace.
//!
//! This crate intentionally stays lightweight: the notification model with
//! its validation rules, the outcome of a delivery attempt, the closed set
//! of server rejection reasons, client configuration, and the shared error
//! taxonomy. The transport engine lives in `apns-client`.

pub mod config;
pub mod error;
pub mod notification;
pub mod outcome;
pub mod reason;

pub use config::{ClientConfig, Endpoint};
pub use error::{Error, Result, ValidationError};
pub use notification::{Notification, NotificationBuilder, Priority, PushType};
pub use outcome::Outcome;
pub use reason::RejectionReason;
