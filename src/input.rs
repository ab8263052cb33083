//! Pointer tracking feeding the `pointerState` uniform.
//!
//! The four components follow the original tool's behavior: 0-1 hold the
//! current pointer position (updated on every move, held button or not), 2-3
//! hold the press position until release, when they flip to the negated
//! absolute release position. Window coordinates arrive top-left origin and
//! are flipped to the bottom-left render origin before storage.

pub(crate) struct PointerState {
    vector: [f32; 4],
}

impl PointerState {
    pub fn new() -> Self {
        Self { vector: [0.0; 4] }
    }

    pub fn pressed(&mut self, x: f32, y: f32, viewport_height: f32) {
        let (x, y) = flip(x, y, viewport_height);
        self.vector = [x, y, x, y];
    }

    /// Updates the current-position components unconditionally. The original
    /// event handler does this regardless of button state, so the literal
    /// behavior is kept.
    pub fn moved(&mut self, x: f32, y: f32, viewport_height: f32) {
        let (x, y) = flip(x, y, viewport_height);
        self.vector[0] = x;
        self.vector[1] = y;
    }

    pub fn released(&mut self, x: f32, y: f32, viewport_height: f32) {
        let (x, y) = flip(x, y, viewport_height);
        self.vector[2] = -x.abs();
        self.vector[3] = -y.abs();
    }

    pub fn vector(&self) -> [f32; 4] {
        self.vector
    }
}

fn flip(x: f32, y: f32, viewport_height: f32) -> (f32, f32) {
    (x, viewport_height - y)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn press_seeds_all_components() {
        let mut pointer = PointerState::new();
        pointer.pressed(10.0, 20.0, 100.0);
        assert_eq!(pointer.vector(), [10.0, 80.0, 10.0, 80.0]);
    }

    #[test]
    fn move_updates_position_without_press() {
        let mut pointer = PointerState::new();
        pointer.moved(5.0, 30.0, 100.0);
        assert_eq!(pointer.vector(), [5.0, 70.0, 0.0, 0.0]);
    }

    #[test]
    fn release_negates_absolute_position() {
        let mut pointer = PointerState::new();
        pointer.pressed(10.0, 20.0, 100.0);
        pointer.moved(40.0, 60.0, 100.0);
        pointer.released(40.0, 60.0, 100.0);
        assert_eq!(pointer.vector(), [40.0, 40.0, -40.0, -40.0]);
    }
}
