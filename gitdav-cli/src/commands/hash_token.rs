//! Hash-token command - print the digest to configure as GITDAV_TOKEN_HASH

use clap::Args;

/// Print the SHA-256 digest of an intake token
#[derive(Args, Debug)]
pub struct HashTokenArgs {
    /// Token callers will present
    token: String,
}

impl HashTokenArgs {
    pub fn execute(&self) -> anyhow::Result<()> {
        if self.token.trim().is_empty() {
            anyhow::bail!("Token must not be empty");
        }
        println!("{}", gitdav_core::intake::hash_token(&self.token));
        Ok(())
    }
}
