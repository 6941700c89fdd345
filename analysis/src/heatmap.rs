use std::collections::BTreeMap;

use common::demo_analysis::Team;

use crate::event::{PlayerId, Position};

/// Offset applied to world coordinates so that every position on a map is
/// positive.
pub const MAX_COORD: f32 = (1 << 14) as f32;

#[derive(Debug, Clone, PartialEq)]
pub struct Config {
    pub cell_size: f32,
}

impl Default for Config {
    fn default() -> Self {
        Self { cell_size: 32.0 }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct HeatMap {
    max_x: usize,
    max_y: usize,
    max_value: usize,
    rows: Vec<Vec<usize>>,
}

impl HeatMap {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn increment(&mut self, x: usize, y: usize) {
        if self.rows.len() <= y {
            self.rows.resize(y + 1, Vec::new());
        }
        self.max_y = self.max_y.max(y);

        let row = &mut self.rows[y];
        if row.len() <= x {
            row.resize(x + 1, 0);
        }
        self.max_x = self.max_x.max(x);

        let cell = &mut row[x];
        *cell += 1;

        self.max_value = self.max_value.max(*cell);
    }

    pub fn get(&self, x: usize, y: usize) -> usize {
        self.rows
            .get(y)
            .and_then(|row| row.get(x))
            .copied()
            .unwrap_or(0)
    }

    pub fn max_value(&self) -> usize {
        self.max_value
    }

    pub fn is_empty(&self) -> bool {
        self.max_value == 0
    }

    /// Drops the empty rows and columns before the first visited cell.
    pub fn shrink(&mut self) {
        let min_x = self
            .rows
            .iter()
            .filter_map(|row| row.iter().position(|v| *v != 0))
            .min()
            .unwrap_or(0);
        let min_y = self
            .rows
            .iter()
            .position(|row| row.iter().any(|v| *v != 0))
            .unwrap_or(0);

        tracing::trace!("Truncate to Min-X: {} - Min-Y: {}", min_x, min_y);

        let _ = self.rows.drain(0..min_y);
        for row in self.rows.iter_mut() {
            let end = min_x.min(row.len());
            let _ = row.drain(0..end);
        }

        self.max_y = self.rows.len().saturating_sub(1);
        self.max_x = self
            .rows
            .iter()
            .map(|r| r.len())
            .max()
            .unwrap_or(0)
            .saturating_sub(1);
    }

    pub fn as_image(&self) -> image::RgbImage {
        let mut buffer = image::RgbImage::new(self.max_x as u32 + 1, self.max_y as u32 + 1);

        tracing::trace!(
            "Creating Image with Dimensions: {}x{}",
            buffer.width(),
            buffer.height()
        );

        let max = self.max_value.max(1);
        for (y, row) in self.rows.iter().enumerate() {
            for (x, cell) in row.iter().enumerate() {
                let intensity = (*cell * u8::MAX as usize / max) as u8;
                buffer.put_pixel(x as u32, y as u32, image::Rgb([intensity, 0, 0]))
            }
        }

        buffer
    }

    pub fn to_png(&self) -> Result<Vec<u8>, image::ImageError> {
        let mut buffer = std::io::Cursor::new(Vec::new());
        self.as_image()
            .write_to(&mut buffer, image::ImageFormat::Png)?;
        Ok(buffer.into_inner())
    }
}

impl core::fmt::Display for HeatMap {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let size = self.max_value.max(1).ilog10() as usize + 1;

        for row in self.rows.iter() {
            for cell in row.iter().copied() {
                write!(f, "{: ^width$} ", cell, width = size)?;
            }
            writeln!(f)?;
        }

        Ok(())
    }
}

/// Collects positions of living players into one heatmap per player and side.
#[derive(Debug, Default)]
pub struct HeatmapBuilder {
    config: Config,
    heatmaps: BTreeMap<(PlayerId, Team), HeatMap>,
}

impl HeatmapBuilder {
    pub fn new(config: Config) -> Self {
        Self {
            config,
            heatmaps: BTreeMap::new(),
        }
    }

    pub fn cell(&self, position: &Position) -> Option<(usize, usize)> {
        let x = position.x + MAX_COORD;
        let y = position.y + MAX_COORD;
        let extent = 0.0..=2.0 * MAX_COORD;
        if !extent.contains(&x) || !extent.contains(&y) || !(self.config.cell_size > 0.0) {
            return None;
        }

        Some((
            (x / self.config.cell_size) as usize,
            (y / self.config.cell_size) as usize,
        ))
    }

    pub fn observe(&mut self, player: PlayerId, team: Team, position: &Position) {
        let Some((x, y)) = self.cell(position) else {
            tracing::trace!(?position, "Position outside of the map");
            return;
        };

        self.heatmaps
            .entry((player, team))
            .or_default()
            .increment(x, y);
    }

    /// Shrunk heatmaps, ordered by player and side.
    pub fn finish(self) -> Vec<((PlayerId, Team), HeatMap)> {
        self.heatmaps
            .into_iter()
            .map(|(key, mut heatmap)| {
                heatmap.shrink();
                (key, heatmap)
            })
            .collect()
    }
}
