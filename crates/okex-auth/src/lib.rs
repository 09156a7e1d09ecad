//! Login credentials and request signing for the OKEx v3 API
//!
//! # Example
//!
//! ```no_run
//! use okex_auth::Credentials;
//!
//! // Reads OKEX_API_KEY, OKEX_SECRET_KEY and OKEX_PASSPHRASE
//! let creds = Credentials::from_env()?;
//! let login = creds.login_params()?;
//! println!("signed at {}", login.timestamp);
//! # Ok::<(), okex_auth::AuthError>(())
//! ```

pub mod credentials;
pub mod error;

pub use credentials::{
    epoch_timestamp, prehash, Credentials, LoginParams, LOGIN_METHOD, LOGIN_PATH,
};
pub use error::{AuthError, AuthResult};
