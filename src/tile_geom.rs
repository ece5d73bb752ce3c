//! Tile, subband and code-block geometry shared by the encoder and
//! decoder. Both sides derive the identical layout from SIZ and COD alone,
//! which is what makes the packet walk deterministic.

use crate::headers::SizRecord;
use crate::image::SubbandOrientation;

/// Decomposition levels actually performable on a tile: splitting stops
/// once either side would drop below 2 samples.
pub fn effective_levels(width: usize, height: usize, max_levels: u8) -> u8 {
    let mut w = width;
    let mut h = height;
    let mut levels = 0;
    while levels < max_levels && w >= 2 && h >= 2 {
        w = w.div_ceil(2);
        h = h.div_ceil(2);
        levels += 1;
    }
    levels
}

/// Sample dimensions of one component within one tile, honouring the
/// component's subsampling factors.
pub fn component_tile_size(siz: &SizRecord, component: usize, tile_index: u32) -> (usize, usize) {
    let (x0, y0, x1, y1) = siz.tile_rect(tile_index);
    let comp = &siz.components[component];
    let (dx, dy) = (comp.dx as u32, comp.dy as u32);
    let w = x1.div_ceil(dx).saturating_sub(x0.div_ceil(dx)) as usize;
    let h = y1.div_ceil(dy).saturating_sub(y0.div_ceil(dy)) as usize;
    (w, h)
}

/// One subband slot of a tile-component, in codestream slot order
/// (resolution 0 holds LL, every higher resolution HL, LH, HH).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SubbandGeom {
    pub resolution: u8,
    pub orientation: SubbandOrientation,
    /// Decomposition level the subband belongs to, finest = 0.
    pub level: u8,
    pub width: usize,
    pub height: usize,
    /// Code-block grid over this subband.
    pub grid_width: usize,
    pub grid_height: usize,
}

impl SubbandGeom {
    pub fn num_blocks(&self) -> usize {
        self.grid_width * self.grid_height
    }

    /// Rectangle of code-block (bx, by): (x0, y0, width, height).
    pub fn block_rect(
        &self,
        bx: usize,
        by: usize,
        cb: (usize, usize),
    ) -> (usize, usize, usize, usize) {
        let x0 = bx * cb.0;
        let y0 = by * cb.1;
        (x0, y0, cb.0.min(self.width - x0), cb.1.min(self.height - y0))
    }
}

/// Subband slots of a tile of the given size under `levels` decompositions,
/// with `cb` the nominal code-block dimensions.
pub fn subband_layout(
    tile_width: usize,
    tile_height: usize,
    levels: u8,
    cb: (usize, usize),
) -> Vec<SubbandGeom> {
    // Parent dimensions per decomposition level, finest first.
    let mut parent_dims = Vec::with_capacity(levels as usize + 1);
    let mut w = tile_width;
    let mut h = tile_height;
    for _ in 0..levels {
        parent_dims.push((w, h));
        w = w.div_ceil(2);
        h = h.div_ceil(2);
    }
    let (ll_w, ll_h) = (w, h);

    let grid = |sw: usize, sh: usize| {
        if sw == 0 || sh == 0 {
            (0, 0)
        } else {
            (sw.div_ceil(cb.0), sh.div_ceil(cb.1))
        }
    };

    let mut out = Vec::with_capacity(1 + 3 * levels as usize);
    let (gw, gh) = grid(ll_w, ll_h);
    out.push(SubbandGeom {
        resolution: 0,
        orientation: SubbandOrientation::LL,
        level: levels.saturating_sub(1),
        width: ll_w,
        height: ll_h,
        grid_width: gw,
        grid_height: gh,
    });

    for resolution in 1..=levels {
        let level = levels - resolution;
        let (pw, ph) = parent_dims[level as usize];
        let lw = pw.div_ceil(2);
        let lh = ph.div_ceil(2);
        let bands = [
            (SubbandOrientation::HL, pw - lw, lh),
            (SubbandOrientation::LH, lw, ph - lh),
            (SubbandOrientation::HH, pw - lw, ph - lh),
        ];
        for (orientation, sw, sh) in bands {
            let (gw, gh) = grid(sw, sh);
            out.push(SubbandGeom {
                resolution,
                orientation,
                level,
                width: sw,
                height: sh,
                grid_width: gw,
                grid_height: gh,
            });
        }
    }
    out
}

/// Complete coding layout of one tile-component.
#[derive(Debug, Clone)]
pub struct TileComponentLayout {
    pub width: usize,
    pub height: usize,
    pub levels: u8,
    pub subbands: Vec<SubbandGeom>,
}

pub fn tile_component_layout(
    siz: &SizRecord,
    cod: &crate::headers::CodRecord,
    component: usize,
    tile_index: u32,
) -> TileComponentLayout {
    let (width, height) = component_tile_size(siz, component, tile_index);
    let levels = effective_levels(width, height, cod.decomposition_levels);
    let subbands = subband_layout(width, height, levels, cod.code_block_size());
    TileComponentLayout {
        width,
        height,
        levels,
        subbands,
    }
}

/// Subband slots belonging to one resolution, as indices into the layout.
pub fn subbands_of_resolution(layout: &[SubbandGeom], resolution: u8) -> Vec<usize> {
    layout
        .iter()
        .enumerate()
        .filter(|(_, g)| g.resolution == resolution)
        .map(|(i, _)| i)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::image::ComponentInfo;

    #[test]
    fn effective_levels_respect_minimum_size() {
        assert_eq!(effective_levels(64, 64, 5), 5);
        assert_eq!(effective_levels(8, 8, 10), 3);
        assert_eq!(effective_levels(16, 1, 4), 0);
        assert_eq!(effective_levels(3, 3, 4), 1);
    }

    #[test]
    fn layout_slot_order_and_sizes() {
        let layout = subband_layout(17, 13, 2, (64, 64));
        assert_eq!(layout.len(), 7);
        // Slot 0: LL after two splits: 17 -> 9 -> 5, 13 -> 7 -> 4.
        assert_eq!(layout[0].orientation, SubbandOrientation::LL);
        assert_eq!((layout[0].width, layout[0].height), (5, 4));
        // Resolution 1 holds the coarser details (level 1, parent 9x7).
        assert_eq!(layout[1].orientation, SubbandOrientation::HL);
        assert_eq!(layout[1].level, 1);
        assert_eq!((layout[1].width, layout[1].height), (4, 4));
        assert_eq!((layout[2].width, layout[2].height), (5, 3));
        assert_eq!((layout[3].width, layout[3].height), (4, 3));
        // Resolution 2 is the finest detail level (level 0).
        assert_eq!(layout[4].level, 0);
        assert_eq!((layout[4].width, layout[4].height), (8, 7));
    }

    #[test]
    fn grids_cover_subbands() {
        let layout = subband_layout(100, 80, 1, (32, 32));
        let hl = &layout[1];
        assert_eq!((hl.width, hl.height), (50, 40));
        assert_eq!((hl.grid_width, hl.grid_height), (2, 2));
        assert_eq!(hl.block_rect(1, 1, (32, 32)), (32, 32, 18, 8));
    }

    #[test]
    fn subsampled_component_tile_sizes() {
        let siz = SizRecord {
            width: 100,
            height: 60,
            tile_width: 64,
            tile_height: 64,
            components: vec![
                ComponentInfo::default(),
                ComponentInfo {
                    dx: 2,
                    dy: 2,
                    ..Default::default()
                },
            ],
            ..Default::default()
        };
        assert_eq!(component_tile_size(&siz, 0, 0), (64, 60));
        assert_eq!(component_tile_size(&siz, 0, 1), (36, 60));
        assert_eq!(component_tile_size(&siz, 1, 0), (32, 30));
        assert_eq!(component_tile_size(&siz, 1, 1), (18, 30));
    }

    #[test]
    fn resolution_slot_lookup() {
        let layout = subband_layout(64, 64, 3, (16, 16));
        assert_eq!(subbands_of_resolution(&layout, 0), vec![0]);
        assert_eq!(subbands_of_resolution(&layout, 2), vec![4, 5, 6]);
    }
}
