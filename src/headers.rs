//! Typed views of the marker segments (Annex A layouts).

use crate::config::ProgressionOrder;
use crate::error::{CodecError, Result};
use crate::image::{validate_code_block_size, ComponentInfo};

/// Code-block style bits carried in COD/COC.
pub const STYLE_TERMINATE_EACH_PASS: u8 = 0x04;
pub const STYLE_SEGMENTATION_SYMBOLS: u8 = 0x20;
/// Bit 6 selects the HT (Part 15) block coder.
pub const STYLE_HT_BLOCK_CODER: u8 = 0x40;

/// Pcap bit signalling a Part 15 codestream.
pub const PCAP_HTJ2K_BIT: u32 = 1 << 14;
/// Ccap bit 0: HT code-blocks present; bit 1: mixed HT and legacy blocks.
pub const CCAP_HT_PRESENT: u16 = 0x01;
pub const CCAP_HT_MIXED: u16 = 0x02;
/// Pcpf bit 15 selects Part 15 profiles.
pub const CPF_PART15_BIT: u16 = 1 << 15;

/// SIZ - image and tile geometry.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct SizRecord {
    pub rsiz: u16,
    pub width: u32,
    pub height: u32,
    pub x_offset: u32,
    pub y_offset: u32,
    pub tile_width: u32,
    pub tile_height: u32,
    pub tile_x_offset: u32,
    pub tile_y_offset: u32,
    pub components: Vec<ComponentInfo>,
}

impl SizRecord {
    pub fn validate(&self) -> Result<()> {
        if self.width == 0 || self.height == 0 {
            return Err(CodecError::invalid_data(format!(
                "SIZ: image {}x{} has a zero dimension",
                self.width, self.height
            )));
        }
        if self.tile_width == 0 || self.tile_height == 0 {
            return Err(CodecError::invalid_data(
                "SIZ: XTsiz and YTsiz must be at least 1".to_string(),
            ));
        }
        if self.components.is_empty() || self.components.len() > 16384 {
            return Err(CodecError::invalid_data(format!(
                "SIZ: Csiz {} outside [1, 16384]",
                self.components.len()
            )));
        }
        if self.x_offset >= self.width || self.y_offset >= self.height {
            return Err(CodecError::invalid_data(format!(
                "SIZ: image offset ({}, {}) outside the reference grid",
                self.x_offset, self.y_offset
            )));
        }
        Ok(())
    }

    /// Number of tiles horizontally and vertically.
    pub fn tile_grid(&self) -> (u32, u32) {
        let across = (self.width - self.tile_x_offset).div_ceil(self.tile_width);
        let down = (self.height - self.tile_y_offset).div_ceil(self.tile_height);
        (across.max(1), down.max(1))
    }

    /// Pixel rectangle of tile `index` (x0, y0, x1, y1), clamped to the
    /// image area.
    pub fn tile_rect(&self, index: u32) -> (u32, u32, u32, u32) {
        let (across, _) = self.tile_grid();
        let tx = index % across;
        let ty = index / across;
        let x0 = (self.tile_x_offset + tx * self.tile_width).max(self.x_offset);
        let y0 = (self.tile_y_offset + ty * self.tile_height).max(self.y_offset);
        let x1 = (self.tile_x_offset + (tx + 1) * self.tile_width).min(self.width);
        let y1 = (self.tile_y_offset + (ty + 1) * self.tile_height).min(self.height);
        (x0, y0, x1, y1)
    }
}

/// COD - default coding style.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CodRecord {
    pub coding_style: u8,
    pub progression_order: ProgressionOrder,
    pub num_layers: u16,
    pub mct: u8,
    pub decomposition_levels: u8,
    /// log2 of the code-block dimensions (stored on the wire minus 2).
    pub code_block_width_exp: u8,
    pub code_block_height_exp: u8,
    pub code_block_style: u8,
    /// 1 = reversible 5/3, 0 = irreversible 9/7.
    pub transform: u8,
    pub precinct_sizes: Vec<u8>,
}

impl Default for CodRecord {
    fn default() -> Self {
        Self {
            coding_style: 0,
            progression_order: ProgressionOrder::Lrcp,
            num_layers: 1,
            mct: 0,
            decomposition_levels: 5,
            code_block_width_exp: 6,
            code_block_height_exp: 6,
            code_block_style: 0,
            transform: 1,
            precinct_sizes: Vec::new(),
        }
    }
}

impl CodRecord {
    pub fn validate(&self) -> Result<()> {
        if self.decomposition_levels > 32 {
            return Err(CodecError::invalid_data(format!(
                "COD: {} decomposition levels exceed 32",
                self.decomposition_levels
            )));
        }
        if self.num_layers == 0 {
            return Err(CodecError::invalid_data(
                "COD: zero quality layers".to_string(),
            ));
        }
        validate_code_block_size(
            1usize << self.code_block_width_exp,
            1usize << self.code_block_height_exp,
        )
        .map_err(|_| {
            CodecError::invalid_data(format!(
                "COD: code-block exponents {}/{} outside the legal range",
                self.code_block_width_exp, self.code_block_height_exp
            ))
        })
    }

    /// Losslessness follows the transform field alone; CPF profile bits are
    /// never consulted.
    pub fn is_reversible(&self) -> bool {
        self.transform == 1
    }

    pub fn uses_ht(&self) -> bool {
        self.code_block_style & STYLE_HT_BLOCK_CODER != 0
    }

    pub fn code_block_size(&self) -> (usize, usize) {
        (
            1usize << self.code_block_width_exp,
            1usize << self.code_block_height_exp,
        )
    }
}

/// COC - per-component coding style override.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CocRecord {
    pub component: u16,
    pub cod: CodRecord,
}

/// QCD - default quantization.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QcdRecord {
    /// 0 = no quantization (1-byte exponents), 1 = scalar derived, 2 =
    /// scalar expounded (2-byte exponent/mantissa pairs).
    pub style: u8,
    pub guard_bits: u8,
    /// (exponent, mantissa) per subband slot; mantissa 0 for style 0.
    pub steps: Vec<(u8, u16)>,
}

impl Default for QcdRecord {
    fn default() -> Self {
        Self {
            style: 0,
            guard_bits: 2,
            steps: vec![(8, 0)],
        }
    }
}

impl QcdRecord {
    pub fn validate(&self) -> Result<()> {
        if self.style > 2 {
            return Err(CodecError::invalid_data(format!(
                "QCD: quantization style {} outside [0, 2]",
                self.style
            )));
        }
        if self.guard_bits > 15 {
            return Err(CodecError::invalid_data(format!(
                "QCD: guard bits {} exceed 15",
                self.guard_bits
            )));
        }
        if self.steps.is_empty() {
            return Err(CodecError::invalid_data(
                "QCD: no step-size fields".to_string(),
            ));
        }
        Ok(())
    }
}

/// QCC - per-component quantization override.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QccRecord {
    pub component: u16,
    pub qcd: QcdRecord,
}

/// CAP - extended capability signalling.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct CapRecord {
    pub pcap: u32,
    pub ccap: Vec<u16>,
}

impl CapRecord {
    /// A Part 15 CAP with the HT-present bit, optionally flagging mixed
    /// HT/legacy code-blocks.
    pub fn htj2k(mixed: bool) -> Self {
        let mut ccap = CCAP_HT_PRESENT;
        if mixed {
            ccap |= CCAP_HT_MIXED;
        }
        Self {
            pcap: PCAP_HTJ2K_BIT,
            ccap: vec![ccap],
        }
    }

    pub fn signals_htj2k(&self) -> bool {
        self.pcap & PCAP_HTJ2K_BIT != 0
    }
}

/// CPF - corresponding profile.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct CpfRecord {
    pub pcpf: u16,
}

impl CpfRecord {
    pub fn profile(&self) -> u16 {
        self.pcpf & 0x7FFF
    }

    pub fn is_part15(&self) -> bool {
        self.pcpf & CPF_PART15_BIT != 0
    }
}

/// One node of an ADS decomposition tree.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct AdsNode {
    pub horizontal: bool,
    pub vertical: bool,
    pub kernel_index: u8,
}

/// ADS - arbitrary decomposition style (Part 2).
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct AdsRecord {
    pub index: u8,
    /// 0 = Mallat; other values select packet-wavelet splits.
    pub decomposition_order: u8,
    pub max_levels: u8,
    pub nodes: Vec<AdsNode>,
}

impl AdsRecord {
    pub fn validate(&self) -> Result<()> {
        if self.max_levels > 32 {
            return Err(CodecError::invalid_data(format!(
                "ADS: {} levels exceed 32",
                self.max_levels
            )));
        }
        if self.decomposition_order > 1 {
            return Err(CodecError::invalid_data(format!(
                "ADS: unknown decomposition order {}",
                self.decomposition_order
            )));
        }
        Ok(())
    }
}

/// SOT - tile-part header.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct SotRecord {
    pub tile_index: u16,
    /// Psot: total tile-part length including the SOT marker itself; zero
    /// means "runs to the next SOT or EOC".
    pub tile_part_length: u32,
    pub tile_part_index: u8,
    pub num_tile_parts: u8,
}

/// Everything gathered from the main header.
#[derive(Debug, Clone, Default)]
pub struct MainHeader {
    pub siz: SizRecord,
    pub cod: CodRecord,
    pub coc: Vec<CocRecord>,
    pub qcd: QcdRecord,
    pub qcc: Vec<QccRecord>,
    pub cap: Option<CapRecord>,
    pub cpf: Option<CpfRecord>,
    pub ads: Vec<AdsRecord>,
}

impl MainHeader {
    /// Coding style in effect for a component.
    pub fn cod_for(&self, component: u16) -> &CodRecord {
        self.coc
            .iter()
            .find(|c| c.component == component)
            .map(|c| &c.cod)
            .unwrap_or(&self.cod)
    }

    /// Quantization in effect for a component.
    pub fn qcd_for(&self, component: u16) -> &QcdRecord {
        self.qcc
            .iter()
            .find(|q| q.component == component)
            .map(|q| &q.qcd)
            .unwrap_or(&self.qcd)
    }
}
