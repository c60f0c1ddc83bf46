//! Trust decisions for inbound SAML messages.
//!
//! A [`TrustContext`] holds the service provider's view of its identity
//! providers. A [`TrustDecisionAssembler`] borrows one snapshot of it and
//! turns each inbound message into a [`TrustDecision`].

mod assembler;
mod certificate;
mod context;
mod identity;
mod mapper;
mod provider;

pub use assembler::{
    ArtifactResolution, ExchangeContext, InboundMessage, LogoutMessage, RejectReason, Rejection,
    TrustDecision, TrustDecisionAssembler,
};
pub use certificate::CertificateSpecification;
pub use context::TrustContext;
pub use identity::{Identity, SubjectId};
pub use mapper::{PersistentPseudonymMapper, StaticPseudonymMapper};
pub use provider::IdentityProvider;
