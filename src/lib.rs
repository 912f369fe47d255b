//! Soul Mediation Core.
//!
//! A streaming, event-driven personal-governance middleware: a soul engine
//! mediates dialogue and intercepts proposed operations against a set of
//! principle coordinates; a flux runtime lifts that engine to an event
//! stream with synchronous perturbation injection; an axiom/constitution
//! pipeline mines recurring values out of past decisions, validates them as
//! loss fixed points, and tracks contradictions between the ones adopted.

pub mod audit;
pub mod cache;
pub mod constitution;
pub mod coordinates;
pub mod discovery;
pub mod distance;
pub mod error;
pub mod event;
pub mod fixed_point;
pub mod flux;
pub mod generator;
pub mod layer;
pub mod loss;
pub mod observability;
pub mod session;
pub mod soul;
pub mod synergy;
pub mod template;

pub use audit::{AuditEntry, AuditLog, AuditStorage, AuditSummary, InMemoryAuditStorage};
pub use cache::LossCache;
pub use constitution::{
    Constitution, ConstitutionService, ConstitutionSnapshot, ConstitutionalAxiom, Contradiction,
    ContradictionStrength, InMemoryConstitutionStore,
};
pub use coordinates::{Axis, Coordinates};
pub use discovery::{DiscoveredAxiom, DiscoveryReport, discover_axioms, discover_from_text};
pub use distance::{
    CanonicalDistance, ContextualF1Model, EmbeddingModel, EntailmentModel, JaccardDistance, SemanticDistance,
};
pub use error::{CoreError, CoreResult};
pub use event::{Event, EventKind, Payload};
pub use fixed_point::{FixedPointResult, detect_fixed_point, detect_fixed_point_default};
pub use flux::{EventSource, FluxConfig, FluxRuntime, Lifecycle, MirrorSink};
pub use generator::{GenerationRequest, GenerationResponse, Generator};
pub use layer::{Assigner, Layer, LayerAssignment};
pub use loss::LossComputer;
pub use session::SoulSessionManager;
pub use soul::{BudgetTier, InterceptResult, InterceptToken, Mode, Recommendation, SoulConfig, SoulEngine};
pub use synergy::{SynergyBus, SynergyHandler, SynergyResult, Unsubscribe};
