#![forbid(unsafe_code)]

//! APNs client transport engine.
//!
//! A [`Client`] maintains a pool of multiplexed HTTP/2 + TLS connections to
//! APNs, signs requests with cached provider tokens (or presents a client
//! certificate), and resolves each submission to an [`Outcome`].
//!
//! ```no_run
//! use apns_client::{Client, Notification};
//!
//! # async fn example(signing_key: apns_client::SigningKey) -> apns_core::Result<()> {
//! let client = Client::builder()
//!     .sandbox()
//!     .signing_key(signing_key)
//!     .build()
//!     .await?;
//!
//! let notification = Notification::builder(
//!     "0123456789abcdef0123456789abcdef",
//!     "com.example.app",
//!     &br#"{"aps":{"alert":"hello"}}"#[..],
//! )
//! .build()?;
//!
//! let outcome = client.send(&notification).await?;
//! println!("{outcome:?}");
//! client.shutdown(std::time::Duration::from_secs(30)).await;
//! # Ok(())
//! # }
//! ```

pub mod client;
pub mod connect;
pub mod connection;
pub mod metrics;
pub mod tls;

mod dispatcher;
mod pool;

pub use client::{Client, ClientBuilder};
pub use connect::{Connect, IoStream, PlainConnector, TlsConnector};
pub use connection::{ConnectionEndpoint, ConnectionState};
pub use metrics::{Acknowledgement, MetricsListener, NoopMetrics};
pub use tls::ClientIdentity;

// Re-exported so callers need only this crate for the common path.
pub use apns_auth::{SigningKey, VerificationKey};
pub use apns_core::{
    ClientConfig, Endpoint, Error, Notification, NotificationBuilder, Outcome, Priority, PushType,
    RejectionReason, Result,
};
