use super::coords::ClientPoint;

#[derive(Debug, Clone, PartialEq)]
pub enum PointerSource {
    Mouse(ClientPoint),
    Touch(Vec<ClientPoint>),
}

impl PointerSource {
    pub fn mouse(x: f32, y: f32) -> Self {
        Self::Mouse(ClientPoint::new(x, y))
    }

    pub fn touch(x: f32, y: f32) -> Self {
        Self::Touch(vec![ClientPoint::new(x, y)])
    }

    pub fn position(&self) -> Option<ClientPoint> {
        match self {
            Self::Mouse(point) => Some(*point),
            Self::Touch(points) => points.first().copied(),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum PointerEvent {
    Down(PointerSource),
    Move(PointerSource),
    Up,
    Leave,
}

impl PointerEvent {
    pub fn position(&self) -> Option<ClientPoint> {
        match self {
            Self::Down(source) | Self::Move(source) => source.position(),
            Self::Up | Self::Leave => None,
        }
    }

    pub fn ends_gesture(&self) -> bool {
        matches!(self, Self::Up | Self::Leave)
    }
}
