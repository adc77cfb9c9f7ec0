//! Service credentials.
//!
//! - [`service_account`] - the service identity and its private key
//! - [`assertion`] - signed JWT-bearer assertions
//! - [`broker`] - cached access tokens exchanged for those assertions

pub mod assertion;
pub mod broker;
pub mod service_account;

pub use assertion::{AssertionClaims, AssertionSigner};
pub use broker::{AccessTokenBroker, AccessTokenSource, JWT_BEARER_GRANT_TYPE, StaticAccessToken};
pub use service_account::{ENV_CLIENT_EMAIL, ENV_PRIVATE_KEY, ENV_PROJECT_ID, ServiceIdentity};
