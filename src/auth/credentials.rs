//! Credential storage
//!
//! Fixed in-memory username/password table consulted by `<auth>` messages.

use std::collections::HashMap;
use std::sync::LazyLock;

/// Static credential store - no external identity provider is consulted
pub(crate) static CREDENTIALS: LazyLock<HashMap<&'static str, &'static str>> =
    LazyLock::new(|| {
        let mut creds = HashMap::new();
        creds.insert("piotr", "password");
        creds
    });
