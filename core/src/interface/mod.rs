pub mod detection;
pub mod hardware;
pub mod vehicle;

pub use detection::{ChannelDiagnostics, SteeringDirection, TargetCluster, TargetEstimate};
pub use hardware::{ChirpTransmitter, EchoReceiver, SonarHardware, ThrustActuator, VehicleStateSource};
pub use vehicle::{GuidanceCommand, ThrustMix, VehicleState};
