//! Intermediate Representation (IR): the provider-neutral data model every
//! frontend and backend adapter speaks.
//!
//! IR is produced only by a frontend adapter and consumed only by a backend
//! adapter. No frontend ever calls another frontend, and no backend ever
//! produces another provider's native format.

pub mod capabilities;
pub mod content;
pub mod message;
pub mod metadata;
pub mod params;
pub mod request;
pub mod response;
pub mod stream;

pub use capabilities::{Capabilities, SystemMessageStrategy, TemperatureRange};
pub use content::{ContentPart, ImageSource};
pub use message::{Content, Message, Role};
pub use metadata::{Fidelity, Metadata, Provenance, SemanticTransform, Warning};
pub use params::Parameters;
pub use request::{Request, StreamMode};
pub use response::{FinishReason, Response, TokenUsage};
pub use stream::StreamChunk;

/// Generate a fresh, unique request id.
pub fn new_request_id() -> String {
    uuid::Uuid::new_v4().to_string()
}
