// --- Drag-and-drop reordering -------------------------------------------
//
// While an item is dragged, every pointer move decides where it would land:
// compare the pointer against the vertical midpoint of each *other* rendered
// row and insert the dragged item before the nearest row whose midpoint is
// still below the pointer. No such row means "append".
//
// The session only rearranges its own copy of the names. Nothing reaches the
// registry until the drop commits the final order through
// `FileRegistry::reorder`.

use serde::{Deserialize, Serialize};

/// Bounding box of one rendered row, in the same coordinate space as the pointer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ItemBox {
    pub name: String,
    pub top: f64,
    pub height: f64,
}

impl ItemBox {
    pub fn midpoint(&self) -> f64 {
        self.top + self.height / 2.0
    }
}

/// Uniform-height rows stacked from `top` downwards.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RowLayout {
    pub top: f64,
    pub row_height: f64,
}

impl Default for RowLayout {
    fn default() -> Self {
        Self {
            top: 0.0,
            row_height: 32.0,
        }
    }
}

/// Index of the candidate the dragged item should be inserted before, or
/// `None` to append.
///
/// Candidates with equal offsets resolve to the first one encountered.
pub fn insertion_index(candidates: &[ItemBox], pointer_y: f64) -> Option<usize> {
    let mut closest: Option<(usize, f64)> = None;
    for (idx, item) in candidates.iter().enumerate() {
        let offset = pointer_y - item.midpoint();
        if offset >= 0.0 {
            continue;
        }
        match closest {
            Some((_, best)) if offset <= best => {}
            _ => closest = Some((idx, offset)),
        }
    }
    closest.map(|(idx, _)| idx)
}

/// Move `dragged` so it sits immediately before `anchor` (or last).
fn splice_before(order: &mut Vec<String>, dragged: &str, anchor: Option<&str>) {
    let Some(from) = order.iter().position(|n| n == dragged) else {
        return;
    };
    let item = order.remove(from);
    let to = anchor
        .and_then(|a| order.iter().position(|n| n == a))
        .unwrap_or(order.len());
    order.insert(to, item);
}

#[derive(Debug, Clone)]
pub struct DragSession {
    dragged: String,
    order: Vec<String>,
    layout: RowLayout,
}

impl DragSession {
    /// `None` if `dragged` is not part of `order`.
    pub fn begin(order: Vec<String>, dragged: &str, layout: RowLayout) -> Option<Self> {
        if !order.iter().any(|n| n == dragged) {
            return None;
        }
        Some(Self {
            dragged: dragged.to_string(),
            order,
            layout,
        })
    }

    pub fn dragged(&self) -> &str {
        &self.dragged
    }

    pub fn order(&self) -> &[String] {
        &self.order
    }

    /// Boxes of every row except the dragged one, laid out from the current
    /// order. The dragged row still occupies its slot, as it does on screen.
    pub fn rendered_boxes(&self) -> Vec<ItemBox> {
        self.order
            .iter()
            .enumerate()
            .filter(|(_, name)| **name != self.dragged)
            .map(|(slot, name)| ItemBox {
                name: name.clone(),
                top: self.layout.top + slot as f64 * self.layout.row_height,
                height: self.layout.row_height,
            })
            .collect()
    }

    /// Pointer moved; rearrange using the session's own row layout.
    pub fn drag_over(&mut self, pointer_y: f64) {
        let boxes = self.rendered_boxes();
        self.drag_over_boxes(pointer_y, &boxes);
    }

    /// Pointer moved; rearrange using boxes measured by the caller. Boxes for
    /// the dragged row itself are ignored.
    pub fn drag_over_boxes(&mut self, pointer_y: f64, boxes: &[ItemBox]) {
        let candidates: Vec<ItemBox> = boxes
            .iter()
            .filter(|b| b.name != self.dragged)
            .cloned()
            .collect();
        let anchor = insertion_index(&candidates, pointer_y).map(|i| candidates[i].name.as_str());
        splice_before(&mut self.order, &self.dragged, anchor);
    }

    /// The order to hand to `FileRegistry::reorder`.
    pub fn finish(self) -> Vec<String> {
        self.order
    }
}
