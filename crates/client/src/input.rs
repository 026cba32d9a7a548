use std::time::Duration;

use glam::Vec2;

use salvo::net::{InputButtons, MessageBody};

const LEG_DURATION: Duration = Duration::from_millis(1500);
const TURN_RATE: f32 = 0.5;
const LEGS: [InputButtons; 4] = [
    InputButtons::FORWARD,
    InputButtons::RIGHT,
    InputButtons::BACK,
    InputButtons::LEFT,
];

/// Stand-in for a player: walks a box, turning slowly, jumping at the start
/// of every leg.
#[derive(Debug, Default)]
pub struct InputScript {
    last_leg: Option<usize>,
}

impl InputScript {
    pub fn sample(&mut self, elapsed: Duration) -> MessageBody {
        let leg = (elapsed.as_millis() / LEG_DURATION.as_millis()) as usize % LEGS.len();
        let mut buttons = LEGS[leg];
        if self.last_leg != Some(leg) {
            buttons |= InputButtons::JUMP;
            self.last_leg = Some(leg);
        }

        let yaw = (elapsed.as_secs_f32() * TURN_RATE) % std::f32::consts::TAU;
        MessageBody::Input {
            buttons,
            aim: Vec2::new(yaw, 0.0),
        }
    }
}
