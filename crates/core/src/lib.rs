pub mod catalog;
pub mod language;
pub mod pipeline;
pub mod providers;
pub mod registry;
pub mod session;
pub mod transcript;

pub use language::{Resolution, ResolutionSource, canonicalize, resolve};
pub use pipeline::{CompositionPreferences, PipelinePlan, Topology, compose};
pub use providers::{Capability, ProviderCapabilityRegistry, ProviderDescriptor, ProviderId};
pub use registry::SessionRegistry;
pub use session::{SessionInfo, SessionState};
pub use transcript::{TranscriptEvent, TranscriptNormalizer};
