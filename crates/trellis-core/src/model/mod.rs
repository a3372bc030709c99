//! The `ModelClient` trait -- the adapter interface for the external
//! structured-generation service.
//!
//! The engine only ever needs two things from the model side: a fresh
//! conversation context, and one buffered completion addressed to an
//! existing context. The trait is intentionally object-safe so it can be
//! shared as `Arc<dyn ModelClient>` with the background worker.

pub mod command;

use anyhow::Result;
use async_trait::async_trait;

pub use command::CommandModelClient;

/// Adapter interface for the external model service.
#[async_trait]
pub trait ModelClient: Send + Sync {
    /// Human-readable name for this client (e.g. "command").
    fn name(&self) -> &str;

    /// Create a new conversation context and return its opaque handle.
    async fn create_thread(&self) -> Result<String>;

    /// Send a prompt addressed to an existing conversation context and
    /// return the model's raw text output.
    ///
    /// `api_key`, when present, is the user's own model API key from the
    /// secret store.
    async fn generate(
        &self,
        thread_handle: &str,
        prompt: &str,
        api_key: Option<&str>,
    ) -> Result<String>;
}

// Compile-time assertion: ModelClient must be object-safe.
const _: () = {
    fn _assert_object_safe(_: &dyn ModelClient) {}
};

#[cfg(test)]
mod tests {
    use super::*;

    /// A trivial client proving the trait can be implemented and used as
    /// `dyn ModelClient`.
    struct EchoClient;

    #[async_trait]
    impl ModelClient for EchoClient {
        fn name(&self) -> &str {
            "echo"
        }

        async fn create_thread(&self) -> Result<String> {
            Ok("thread-0".to_string())
        }

        async fn generate(
            &self,
            _thread_handle: &str,
            prompt: &str,
            _api_key: Option<&str>,
        ) -> Result<String> {
            Ok(prompt.to_string())
        }
    }

    #[test]
    fn model_client_is_object_safe() {
        let client: Box<dyn ModelClient> = Box::new(EchoClient);
        assert_eq!(client.name(), "echo");
    }

    #[tokio::test]
    async fn echo_client_roundtrip() {
        let client: Box<dyn ModelClient> = Box::new(EchoClient);
        let thread = client.create_thread().await.unwrap();
        let output = client.generate(&thread, "hello", None).await.unwrap();
        assert_eq!(output, "hello");
    }
}
