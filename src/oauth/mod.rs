mod authorizer;
mod callback;
mod credential;
mod endpoints;
mod signer;

pub use authorizer::{Authorizer, CredentialHolder};
pub use credential::{Credential, CredentialStore};
pub use endpoints::GoogleOAuth;
pub use signer::Signer;

#[cfg(test)]
pub(crate) use credential::test_helpers;
