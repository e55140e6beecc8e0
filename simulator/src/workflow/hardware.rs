use sonarcore::interface::{
    ChirpTransmitter, EchoReceiver, ThrustActuator, ThrustMix, VehicleState, VehicleStateSource,
};
use sonarcore::math::Vec3;
use sonarcore::processing::Waveform;
use sonarcore::{ChannelMatrix, SonarError, SonarResult};

use crate::generator::profile::{EchoSynthesizer, SimTarget};

/// Stand-in for the transducer, ADC and flight controller.
///
/// The vehicle is tracked in world coordinates but reported to the core in
/// the sonar-centred frame (position at the origin), matching the frame the
/// core's range/bearing estimates are expressed in.
pub struct SimulatedHardware {
    synthesizer: EchoSynthesizer,
    targets: Vec<SimTarget>,
    vehicle: VehicleState,
    relative: Vec<(Vec3, f32)>,
    transmitted: bool,
    pub transmissions: usize,
    pub last_thrust: Option<ThrustMix>,
}

impl SimulatedHardware {
    pub fn new(synthesizer: EchoSynthesizer, targets: Vec<SimTarget>, vehicle: VehicleState) -> Self {
        let relative = Vec::with_capacity(targets.len());
        Self {
            synthesizer,
            targets,
            vehicle,
            relative,
            transmitted: false,
            transmissions: 0,
            last_thrust: None,
        }
    }

    pub fn vehicle(&self) -> VehicleState {
        self.vehicle
    }

    pub fn synthesizer_mut(&mut self) -> &mut EchoSynthesizer {
        &mut self.synthesizer
    }

    /// Distance from the vehicle to the nearest target.
    pub fn nearest_target_m(&self) -> Option<f32> {
        self.targets
            .iter()
            .map(|t| (t.position - self.vehicle.position).norm())
            .reduce(f32::min)
    }

    /// Euler step under the commanded acceleration.
    pub fn integrate(&mut self, acceleration: Vec3, dt: f32) {
        self.vehicle.velocity = self.vehicle.velocity + acceleration * dt;
        self.vehicle.position = self.vehicle.position + self.vehicle.velocity * dt;
    }
}

impl ChirpTransmitter for SimulatedHardware {
    fn transmit(&mut self, waveform: &Waveform) -> SonarResult<()> {
        if waveform.is_empty() {
            return Err(SonarError::Hardware("empty transmit waveform".into()));
        }
        self.transmitted = true;
        self.transmissions += 1;
        Ok(())
    }
}

impl EchoReceiver for SimulatedHardware {
    fn acquire_samples(&mut self, buffers: &mut ChannelMatrix) -> SonarResult<()> {
        if !self.transmitted {
            return Err(SonarError::Hardware("acquisition without transmit".into()));
        }
        self.transmitted = false;
        self.relative.clear();
        let origin = self.vehicle.position;
        self.relative.extend(
            self.targets
                .iter()
                .map(|t| (t.position - origin, t.reflectivity)),
        );
        self.synthesizer.synthesize(&self.relative, buffers);
        Ok(())
    }
}

impl ThrustActuator for SimulatedHardware {
    fn apply_thrust(&mut self, thrust: ThrustMix) -> SonarResult<()> {
        if thrust.iter().any(|t| !(0.0..=1.0).contains(t)) {
            return Err(SonarError::Hardware(format!("thrust {:?} out of range", thrust)));
        }
        self.last_thrust = Some(thrust);
        Ok(())
    }
}

impl VehicleStateSource for SimulatedHardware {
    fn vehicle_state(&mut self) -> VehicleState {
        VehicleState::new(Vec3::zeros(), self.vehicle.velocity)
    }
}
