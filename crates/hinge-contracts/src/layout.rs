use serde::{Deserialize, Serialize};

/// Pixel rectangle of the mirrored window.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct WindowBounds {
    pub left: i32,
    pub top: i32,
    pub width: u32,
    pub height: u32,
}

impl WindowBounds {
    pub fn new(left: i32, top: i32, width: u32, height: u32) -> Self {
        Self {
            left,
            top,
            width,
            height,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Point {
    pub x: i32,
    pub y: i32,
}

impl Point {
    pub const fn new(x: i32, y: i32) -> Self {
        Self { x, y }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Swipe {
    pub from: Point,
    pub to: Point,
}

/// Fixed control offsets for the target app.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct UiLayout {
    pub cross: Point,
    pub heart: Point,
    pub comment_box: Option<Point>,
    pub send: Point,
    pub send_like_anyway: Option<Point>,
}

impl Default for UiLayout {
    fn default() -> Self {
        Self {
            cross: Point::new(810, 854),
            heart: Point::new(1107, 779),
            comment_box: None,
            send: Point::new(1047, 552),
            send_like_anyway: None,
        }
    }
}

impl UiLayout {
    /// Configured comment box, or horizontally centered at 80% of the window
    /// height when no usable offset is configured.
    pub fn comment_box_for(&self, bounds: &WindowBounds) -> Point {
        match self.comment_box {
            Some(point) if point != Point::new(0, 0) => point,
            _ => Point::new((bounds.width / 2) as i32, (bounds.height * 4 / 5) as i32),
        }
    }
}

/// Near-full-screen upward swipe: 90% to 10% of the height, centered.
pub fn scroll_swipe(bounds: &WindowBounds) -> Swipe {
    let center_x = (bounds.width / 2) as i32;
    Swipe {
        from: Point::new(center_x, (bounds.height * 9 / 10) as i32),
        to: Point::new(center_x, (bounds.height / 10) as i32),
    }
}
