pub mod alert;
pub mod dependency;
pub mod recommendation;
pub mod service;
pub mod telemetry;

pub use alert::{AlertStatus, CircularDependencyAlert};
pub use dependency::{
    CommunicationMode, DependencyCriticality, DiscoverySource, EdgeUpsert, RetryConfig,
    ServiceDependency,
};
pub use recommendation::{
    DataQuality, DependencyImpact, Explanation, FeatureAttribution, RecommendationStatus,
    RecommendationTier, SliType, SloRecommendation, TierLevel, TIER_LEVELS,
};
pub use service::{Criticality, Service, ServiceType, ServiceUpsert};
pub use telemetry::{AvailabilitySliData, LatencySliData};
