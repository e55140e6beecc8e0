pub mod law;
pub mod mixer;

pub use law::GuidanceLaw;
pub use mixer::ThrustMixer;
