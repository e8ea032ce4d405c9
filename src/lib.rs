//! # Convogate
//!
//! Backend core of a multi-provider LLM chat gateway: durable
//! per-conversation history, token-budgeted context windowing, and a
//! uniform provider abstraction over OpenAI, Anthropic, and local Ollama
//! backends. The crate is transport-agnostic; an HTTP layer embeds the
//! [`gateway::ChatGateway`] and maps its error taxonomy onto status
//! codes.
//!
//! ## Example
//!
//! ```no_run
//! use convogate::config::Config;
//! use convogate::gateway::{ChatGateway, TurnRequest};
//! use convogate::providers::ProviderRegistry;
//! use convogate::store::{ConversationStore, SledStorage};
//! use std::sync::Arc;
//!
//! # async fn run() -> convogate::error::Result<()> {
//! let config = Config::load("config.yaml")?;
//! let backend = SledStorage::open(&config.storage.path)?;
//! let store = Arc::new(ConversationStore::open(Box::new(backend))?);
//! let registry = ProviderRegistry::from_config(&config.providers)?;
//! let gateway = ChatGateway::new(store, registry);
//!
//! let response = gateway
//!     .send_turn(TurnRequest::new("alice", "Hello!", "ollama"))
//!     .await?;
//! println!("{}", response.content);
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod context;
pub mod error;
pub mod gateway;
pub mod providers;
pub mod store;
pub mod sweep;

pub use error::{GatewayError, Result};
pub use gateway::{ChatGateway, TurnRequest, TurnResponse};
