// cadena-domain library entry point
pub mod contribution;
pub mod delivery;
pub mod draw;
pub mod error;
pub mod group;
pub mod membership;
pub mod plan;
pub use contribution::{Contribution, ContributionStatus};
pub use delivery::{Delivery, DeliveryStatus};
pub use draw::{DrawSession, DrawStatus, PositionAssignment, RevealStep};
pub use error::DomainError;
pub use group::{cycle_label, Group, GroupStatus};
pub use membership::Membership;
pub use plan::Plan;
