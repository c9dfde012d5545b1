/// Role-specific message processing injected into a
/// [`NodeRuntime`](crate::runtime::NodeRuntime).
///
/// The runtime invokes `on_message` once per inbound payload, from the
/// thread of the connection it arrived on. Returning `Some(response)`
/// writes the response back synchronously on the same connection before the
/// receive loop continues; `None` sends nothing. Payloads are opaque to the
/// runtime; any structure is the implementation's concern.
pub trait MessageHandler: Send + Sync {
    fn on_message(&self, payload: &[u8]) -> Option<Vec<u8>>;
}
