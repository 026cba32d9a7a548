use super::message::Message;

/// Implementations must not block.
pub trait GameSession {
    fn dispatch(&mut self, message: Message);
}

impl GameSession for Vec<Message> {
    fn dispatch(&mut self, message: Message) {
        self.push(message);
    }
}

impl<S: GameSession + ?Sized> GameSession for &mut S {
    fn dispatch(&mut self, message: Message) {
        (**self).dispatch(message);
    }
}
