//! Raw CDP command wrapper for vendor-extension methods.
//!
//! Hosted browser providers expose commands outside the standard protocol
//! (certificate upload, managed captcha solving). Those have no typed
//! bindings, so they are sent as method name plus JSON params.

use chromiumoxide_types::{Command, Method, MethodId};
use serde::Serialize;

/// An arbitrary CDP method with JSON params.
#[derive(Debug, Clone)]
pub struct RawCdpCommand {
    method: String,
    params: serde_json::Value,
}

impl RawCdpCommand {
    pub fn new(method: impl Into<String>, params: serde_json::Value) -> Self {
        Self {
            method: method.into(),
            params,
        }
    }
}

impl Serialize for RawCdpCommand {
    fn serialize<S>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        // Only the params form the command payload; the method name travels
        // in the protocol envelope via Method::identifier.
        self.params.serialize(serializer)
    }
}

impl Method for RawCdpCommand {
    fn identifier(&self) -> MethodId {
        self.method.clone().into()
    }
}

impl Command for RawCdpCommand {
    type Response = serde_json::Value;
}
