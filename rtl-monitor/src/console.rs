//! Text display for the threat monitor.
//!
//! `Lane` mode prints one road line per refresh with the bike at the right
//! edge; `Json` mode prints one JSON object per visual change.

use std::collections::BTreeMap;
use std::io::Write;

use log::{debug, warn};

use rtl_core::render::Renderer;
use rtl_core::types::ThreatClass;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputMode {
    Lane,
    Json,
}

#[derive(Debug, Clone, Copy)]
struct Car {
    number: u8,
    position: f64,
    class: ThreatClass,
}

/// Car glyph, after the green/yellow/red car sprites.
fn glyph(class: ThreatClass) -> char {
    match class {
        ThreatClass::Low => 'g',
        ThreatClass::Medium => 'y',
        ThreatClass::High => 'r',
    }
}

pub struct ConsoleRenderer<W: Write> {
    out: W,
    mode: OutputMode,
    columns: usize,
    screen_width: f64,
    next: u32,
    cars: BTreeMap<u32, Car>,
    dirty: bool,
    pub frames_drawn: u64,
}

impl<W: Write> ConsoleRenderer<W> {
    pub fn new(out: W, mode: OutputMode, screen_width: f64, columns: usize) -> Self {
        ConsoleRenderer {
            out,
            mode,
            columns: columns.max(2),
            screen_width,
            next: 0,
            cars: BTreeMap::new(),
            dirty: false,
            frames_drawn: 0,
        }
    }

    #[cfg(test)]
    pub(crate) fn into_inner(self) -> W {
        self.out
    }

    #[cfg(test)]
    pub(crate) fn visible(&self) -> usize {
        self.cars.len()
    }

    /// Render the current road as text. The last column is the bike.
    pub fn lane_line(&self) -> String {
        let road = self.columns - 1;
        let mut cells = vec!['-'; road];
        for car in self.cars.values() {
            if car.position < 0.0 || car.position > self.screen_width {
                continue;
            }
            let col = (car.position / self.screen_width * (road - 1) as f64).round() as usize;
            cells[col.min(road - 1)] = glyph(car.class);
        }
        let mut line: String = cells.into_iter().collect();
        line.push('B');
        line
    }

    fn emit(&mut self, value: serde_json::Value) {
        if let Err(e) = writeln!(self.out, "{value}") {
            warn!("display write failed: {e}");
        }
    }
}

impl<W: Write> Renderer for ConsoleRenderer<W> {
    type Handle = u32;

    fn create_visual(&mut self, number: u8, position: f64, class: ThreatClass) -> u32 {
        self.next += 1;
        let handle = self.next;
        debug!("create visual {handle} for threat {number} ({class}) at x={position:.0}");
        self.cars.insert(
            handle,
            Car {
                number,
                position,
                class,
            },
        );
        if self.mode == OutputMode::Json {
            self.emit(serde_json::json!({
                "event": "create",
                "visual": handle,
                "number": number,
                "position": position,
                "class": class,
            }));
        }
        self.dirty = true;
        handle
    }

    fn update_visual(&mut self, handle: &u32, position: f64) {
        let Some(car) = self.cars.get_mut(handle) else {
            warn!("update for unknown visual {handle}");
            return;
        };
        if car.position == position {
            return;
        }
        car.position = position;
        let number = car.number;
        if self.mode == OutputMode::Json {
            self.emit(serde_json::json!({
                "event": "update",
                "visual": handle,
                "number": number,
                "position": position,
            }));
        }
        self.dirty = true;
    }

    fn destroy_visual(&mut self, handle: u32) {
        let Some(car) = self.cars.remove(&handle) else {
            return;
        };
        debug!("destroy visual {handle} for threat {}", car.number);
        if self.mode == OutputMode::Json {
            self.emit(serde_json::json!({
                "event": "destroy",
                "visual": handle,
                "number": car.number,
            }));
        }
        self.dirty = true;
    }

    fn present(&mut self) {
        if !self.dirty {
            return;
        }
        self.dirty = false;
        self.frames_drawn += 1;
        if self.mode == OutputMode::Lane {
            let line = self.lane_line();
            if let Err(e) = writeln!(self.out, "{line}") {
                warn!("display write failed: {e}");
            }
        }
        if let Err(e) = self.out.flush() {
            warn!("display flush failed: {e}");
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    fn lane() -> ConsoleRenderer<Vec<u8>> {
        ConsoleRenderer::new(Vec::new(), OutputMode::Lane, 1200.0, 11)
    }

    #[test]
    fn test_empty_lane() {
        assert_eq!(lane().lane_line(), "----------B");
    }

    #[test]
    fn test_lane_positions() {
        let mut r = lane();
        r.create_visual(1, 0.0, ThreatClass::Low);
        r.create_visual(2, 1200.0, ThreatClass::High);
        r.create_visual(3, 600.0, ThreatClass::Medium);
        assert_eq!(r.lane_line(), "g----y---rB");
    }

    #[test]
    fn test_offscreen_car_hidden() {
        let mut r = lane();
        r.create_visual(1, -80.0, ThreatClass::Low);
        assert_eq!(r.lane_line(), "----------B");
        assert_eq!(r.visible(), 1);
    }

    #[test]
    fn test_present_only_when_dirty() {
        let mut r = lane();
        r.present();
        assert_eq!(r.frames_drawn, 0);

        let h = r.create_visual(1, 0.0, ThreatClass::Low);
        r.present();
        r.present();
        assert_eq!(r.frames_drawn, 1);

        r.update_visual(&h, 0.0);
        r.present();
        assert_eq!(r.frames_drawn, 1);

        r.destroy_visual(h);
        r.present();
        assert_eq!(r.frames_drawn, 2);

        let out = String::from_utf8(r.into_inner()).unwrap();
        assert_eq!(out, "g---------B\n----------B\n");
    }

    #[test]
    fn test_json_events() {
        let mut r = ConsoleRenderer::new(Vec::new(), OutputMode::Json, 1200.0, 40);
        let h = r.create_visual(4, 240.0, ThreatClass::Medium);
        r.update_visual(&h, 480.0);
        r.destroy_visual(h);
        r.present();

        let out = String::from_utf8(r.into_inner()).unwrap();
        let events: Vec<serde_json::Value> = out
            .lines()
            .map(|l| serde_json::from_str(l).unwrap())
            .collect();
        assert_eq!(events.len(), 3);
        assert_eq!(events[0]["event"], "create");
        assert_eq!(events[0]["class"], "medium");
        assert_eq!(events[0]["number"], 4);
        assert_eq!(events[1]["position"], 480.0);
        assert_eq!(events[2]["event"], "destroy");
    }

    #[test]
    fn test_destroy_unknown_is_ignored() {
        let mut r = lane();
        r.destroy_visual(99);
        r.present();
        assert_eq!(r.frames_drawn, 0);
    }
}
