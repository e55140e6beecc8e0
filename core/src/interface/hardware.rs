//! Narrow capability traits implemented by the hardware adapter.
//!
//! The core never touches peripherals; the orchestrator is handed an adapter
//! implementing these and drives it once per cycle.

use crate::interface::{ThrustMix, VehicleState};
use crate::prelude::{ChannelMatrix, SonarResult};
use crate::processing::chirp::Waveform;

/// Emits the transmit waveform onto the transducer.
pub trait ChirpTransmitter {
    fn transmit(&mut self, waveform: &Waveform) -> SonarResult<()>;
}

/// Blocks for the echo window and fills one row per microphone.
///
/// The buffer shape is fixed at initialization and must not be changed.
pub trait EchoReceiver {
    fn acquire_samples(&mut self, buffers: &mut ChannelMatrix) -> SonarResult<()>;
}

/// Accepts per-cycle thrust values in `[0, 1]`.
pub trait ThrustActuator {
    fn apply_thrust(&mut self, thrust: ThrustMix) -> SonarResult<()>;
}

/// Supplies the current vehicle kinematics.
pub trait VehicleStateSource {
    fn vehicle_state(&mut self) -> VehicleState;
}

/// Everything a full detection-and-guidance cycle talks to.
pub trait SonarHardware: ChirpTransmitter + EchoReceiver + ThrustActuator + VehicleStateSource {}

impl<T> SonarHardware for T where
    T: ChirpTransmitter + EchoReceiver + ThrustActuator + VehicleStateSource
{
}
