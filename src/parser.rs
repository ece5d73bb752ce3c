//! Marker-segment parsing (Annex A). The parser begins at SOC, dispatches
//! each marker by its two-byte code, and skips unrecognised markers in the
//! skippable range by their length field.

use log::{debug, warn};

use crate::config::ProgressionOrder;
use crate::error::{CodecError, Result};
use crate::headers::{
    AdsNode, AdsRecord, CapRecord, CocRecord, CodRecord, CpfRecord, MainHeader, QcdRecord,
    QccRecord, SizRecord, SotRecord,
};
use crate::image::ComponentInfo;
use crate::markers::{is_skippable, MarkerCode};
use crate::stream::StreamReader;

pub struct CodestreamParser<'a> {
    pub reader: StreamReader<'a>,
}

impl<'a> CodestreamParser<'a> {
    pub fn new(data: &'a [u8]) -> Self {
        Self {
            reader: StreamReader::new(data),
        }
    }

    /// Parse the main header: SOC, a mandatory leading SIZ, then markers
    /// until the first SOT (whose marker code is consumed).
    pub fn parse_main_header(&mut self) -> Result<MainHeader> {
        let soc = self.reader.read_u16()?;
        if soc != MarkerCode::StartOfCodestream.as_u16() {
            return Err(CodecError::invalid_data(format!(
                "expected SOC at offset 0, found {soc:#06X}"
            )));
        }

        let mut header = MainHeader::default();
        let mut have_siz = false;

        loop {
            let at = self.reader.position();
            let hi = self.reader.read_u8()?;
            if hi != 0xFF {
                return Err(CodecError::invalid_data(format!(
                    "expected a marker at offset {at}, found byte {hi:#04X}"
                )));
            }
            let lo = self.reader.read_u8()?;
            let marker = MarkerCode::try_from(lo).ok();

            if !have_siz && marker != Some(MarkerCode::ImageAndTileSize) {
                return Err(CodecError::invalid_data(format!(
                    "SIZ must immediately follow SOC, found marker 0xFF{lo:02X}"
                )));
            }

            match marker {
                Some(MarkerCode::ImageAndTileSize) => {
                    if have_siz {
                        return Err(CodecError::invalid_data(
                            "duplicate SIZ marker".to_string(),
                        ));
                    }
                    header.siz = self.parse_siz()?;
                    have_siz = true;
                }
                Some(MarkerCode::CodingStyleDefault) => {
                    header.cod = self.parse_cod()?;
                }
                Some(MarkerCode::CodingStyleComponent) => {
                    let coc = self.parse_coc(&header)?;
                    header.coc.push(coc);
                }
                Some(MarkerCode::QuantizationDefault) => {
                    header.qcd = self.parse_qcd()?;
                }
                Some(MarkerCode::QuantizationComponent) => {
                    let qcc = self.parse_qcc(&header)?;
                    header.qcc.push(qcc);
                }
                Some(MarkerCode::Capability) => {
                    header.cap = Some(self.parse_cap()?);
                }
                Some(MarkerCode::CorrespondingProfile) => {
                    header.cpf = Some(self.parse_cpf()?);
                }
                Some(MarkerCode::ArbitraryDecompositionStyle) => {
                    let ads = self.parse_ads()?;
                    header.ads.push(ads);
                }
                Some(MarkerCode::StartOfTile) => {
                    debug!(
                        "main header parsed: {}x{}, {} components",
                        header.siz.width,
                        header.siz.height,
                        header.siz.components.len()
                    );
                    return Ok(header);
                }
                Some(MarkerCode::EndOfCodestream) => {
                    return Err(CodecError::invalid_data(
                        "EOC before any tile-part".to_string(),
                    ));
                }
                _ => {
                    if !is_skippable(lo) {
                        return Err(CodecError::invalid_data(format!(
                            "unexpected marker 0xFF{lo:02X} at offset {at}"
                        )));
                    }
                    self.skip_segment(lo)?;
                }
            }
        }
    }

    fn skip_segment(&mut self, code: u8) -> Result<()> {
        let len = self.reader.read_u16()?;
        if len < 2 {
            return Err(CodecError::invalid_data(format!(
                "marker 0xFF{code:02X} carries impossible length {len}"
            )));
        }
        warn!("skipping unrecognised marker 0xFF{code:02X} ({len} bytes)");
        self.reader.skip(len as usize - 2)
    }

    fn parse_siz(&mut self) -> Result<SizRecord> {
        let len = self.reader.read_u16()?;
        let siz = SizRecord {
            rsiz: self.reader.read_u16()?,
            width: self.reader.read_u32()?,
            height: self.reader.read_u32()?,
            x_offset: self.reader.read_u32()?,
            y_offset: self.reader.read_u32()?,
            tile_width: self.reader.read_u32()?,
            tile_height: self.reader.read_u32()?,
            tile_x_offset: self.reader.read_u32()?,
            tile_y_offset: self.reader.read_u32()?,
            components: {
                let count = self.reader.read_u16()? as usize;
                if !(1..=16384).contains(&count) {
                    return Err(CodecError::invalid_data(format!(
                        "SIZ: Csiz {count} outside [1, 16384]"
                    )));
                }
                let mut comps = Vec::with_capacity(count);
                for _ in 0..count {
                    let ssiz = self.reader.read_u8()?;
                    comps.push(ComponentInfo {
                        bit_depth: (ssiz & 0x7F) + 1,
                        signed: ssiz & 0x80 != 0,
                        dx: self.reader.read_u8()?,
                        dy: self.reader.read_u8()?,
                    });
                }
                comps
            },
        };
        let expected = 38 + 3 * siz.components.len() as u16;
        if len != expected {
            return Err(CodecError::invalid_data(format!(
                "SIZ: Lsiz {len} does not match {expected} for {} components",
                siz.components.len()
            )));
        }
        siz.validate()?;
        Ok(siz)
    }

    fn parse_spcod(&mut self, remaining: usize) -> Result<CodRecord> {
        if remaining < 5 {
            return Err(CodecError::invalid_data(format!(
                "SPcod fields need 5 bytes, segment leaves {remaining}"
            )));
        }
        let decomposition_levels = self.reader.read_u8()?;
        let cbw = self.reader.read_u8()?;
        let cbh = self.reader.read_u8()?;
        if cbw > 8 || cbh > 8 {
            return Err(CodecError::invalid_data(format!(
                "code-block exponent fields {cbw}/{cbh} exceed the legal range"
            )));
        }
        let code_block_style = self.reader.read_u8()?;
        let transform = self.reader.read_u8()?;
        let mut precinct_sizes = Vec::new();
        for _ in 0..remaining.saturating_sub(5) {
            precinct_sizes.push(self.reader.read_u8()?);
        }
        let cod = CodRecord {
            coding_style: 0,
            progression_order: ProgressionOrder::Lrcp,
            num_layers: 1,
            mct: 0,
            decomposition_levels,
            code_block_width_exp: cbw + 2,
            code_block_height_exp: cbh + 2,
            code_block_style,
            transform,
            precinct_sizes,
        };
        Ok(cod)
    }

    fn parse_cod(&mut self) -> Result<CodRecord> {
        let len = self.reader.read_u16()? as usize;
        if len < 12 {
            return Err(CodecError::invalid_data(format!(
                "COD: Lcod {len} below the 12-byte minimum"
            )));
        }
        let scod = self.reader.read_u8()?;
        let progression_order = ProgressionOrder::from_cod_value(self.reader.read_u8()?)?;
        let num_layers = self.reader.read_u16()?;
        let mct = self.reader.read_u8()?;
        let mut cod = self.parse_spcod(len - 7)?;
        cod.coding_style = scod;
        cod.progression_order = progression_order;
        cod.num_layers = num_layers;
        cod.mct = mct;
        cod.validate()?;
        Ok(cod)
    }

    fn read_component_index(&mut self, header: &MainHeader) -> Result<u16> {
        let num = header.siz.components.len();
        let index = if num < 257 {
            self.reader.read_u8()? as u16
        } else {
            self.reader.read_u16()?
        };
        if index as usize >= num {
            return Err(CodecError::invalid_data(format!(
                "component index {index} outside the {num} declared components"
            )));
        }
        Ok(index)
    }

    fn parse_coc(&mut self, header: &MainHeader) -> Result<CocRecord> {
        let len = self.reader.read_u16()? as usize;
        let comp_bytes = if header.siz.components.len() < 257 { 1 } else { 2 };
        let remaining = len.checked_sub(3 + comp_bytes).ok_or_else(|| {
            CodecError::invalid_data(format!("COC: Lcoc {len} too short for its fields"))
        })?;
        let component = self.read_component_index(header)?;
        let _scoc = self.reader.read_u8()?;
        let mut cod = self.parse_spcod(remaining)?;
        // COC carries no SGcod; those fields follow the main COD.
        cod.coding_style = header.cod.coding_style;
        cod.progression_order = header.cod.progression_order;
        cod.num_layers = header.cod.num_layers;
        cod.mct = header.cod.mct;
        cod.validate()?;
        Ok(CocRecord { component, cod })
    }

    fn parse_quant_payload(&mut self, payload_len: usize) -> Result<QcdRecord> {
        if payload_len < 2 {
            return Err(CodecError::invalid_data(format!(
                "quantization segment payload of {payload_len} bytes has no step fields"
            )));
        }
        let sq = self.reader.read_u8()?;
        let style = sq & 0x1F;
        let guard_bits = sq >> 5;
        if style > 2 {
            return Err(CodecError::invalid_data(format!(
                "quantization style {style} outside [0, 2]"
            )));
        }
        let per_step = if style == 0 { 1 } else { 2 };
        let field_bytes = payload_len - 1;
        if field_bytes % per_step != 0 {
            return Err(CodecError::invalid_data(format!(
                "quantization segment of {field_bytes} bytes does not divide into steps"
            )));
        }
        let mut steps = Vec::with_capacity(field_bytes / per_step);
        for _ in 0..field_bytes / per_step {
            if style == 0 {
                steps.push((self.reader.read_u8()? >> 3, 0));
            } else {
                let v = self.reader.read_u16()?;
                steps.push(((v >> 11) as u8, v & 0x07FF));
            }
        }
        let qcd = QcdRecord {
            style,
            guard_bits,
            steps,
        };
        qcd.validate()?;
        Ok(qcd)
    }

    fn parse_qcd(&mut self) -> Result<QcdRecord> {
        let len = self.reader.read_u16()? as usize;
        if len < 4 {
            return Err(CodecError::invalid_data(format!(
                "QCD: Lqcd {len} below the 4-byte minimum"
            )));
        }
        self.parse_quant_payload(len - 2)
    }

    fn parse_qcc(&mut self, header: &MainHeader) -> Result<QccRecord> {
        let len = self.reader.read_u16()? as usize;
        let comp_bytes = if header.siz.components.len() < 257 { 1 } else { 2 };
        let remaining = len.checked_sub(2 + comp_bytes).ok_or_else(|| {
            CodecError::invalid_data(format!("QCC: Lqcc {len} too short for its fields"))
        })?;
        let component = self.read_component_index(header)?;
        let qcd = self.parse_quant_payload(remaining)?;
        Ok(QccRecord { component, qcd })
    }

    fn parse_cap(&mut self) -> Result<CapRecord> {
        let len = self.reader.read_u16()? as usize;
        if len < 6 {
            return Err(CodecError::invalid_data(format!(
                "CAP: Lcap {len} below the 6-byte minimum"
            )));
        }
        let pcap = self.reader.read_u32()?;
        let mut ccap = Vec::new();
        let mut remaining = len - 6;
        while remaining >= 2 {
            ccap.push(self.reader.read_u16()?);
            remaining -= 2;
        }
        if remaining > 0 {
            self.reader.skip(remaining)?;
        }
        Ok(CapRecord { pcap, ccap })
    }

    fn parse_cpf(&mut self) -> Result<CpfRecord> {
        let len = self.reader.read_u16()?;
        if len != 4 {
            return Err(CodecError::invalid_data(format!(
                "CPF: Lcpf {len} is not 4"
            )));
        }
        Ok(CpfRecord {
            pcpf: self.reader.read_u16()?,
        })
    }

    fn parse_ads(&mut self) -> Result<AdsRecord> {
        let len = self.reader.read_u16()? as usize;
        if len < 5 || (len - 5) % 2 != 0 {
            return Err(CodecError::invalid_data(format!(
                "ADS: Lads {len} does not frame whole nodes"
            )));
        }
        let index = self.reader.read_u8()?;
        let decomposition_order = self.reader.read_u8()?;
        let max_levels = self.reader.read_u8()?;
        let mut nodes = Vec::with_capacity((len - 5) / 2);
        for _ in 0..(len - 5) / 2 {
            let flags = self.reader.read_u8()?;
            nodes.push(AdsNode {
                horizontal: flags & 0x01 != 0,
                vertical: flags & 0x02 != 0,
                kernel_index: self.reader.read_u8()?,
            });
        }
        let ads = AdsRecord {
            index,
            decomposition_order,
            max_levels,
            nodes,
        };
        ads.validate()?;
        Ok(ads)
    }

    /// Parse one tile-part header after its SOT marker code has been
    /// consumed, up to and including SOD.
    pub fn parse_tile_part_header(&mut self) -> Result<SotRecord> {
        let len = self.reader.read_u16()?;
        if len != 10 {
            return Err(CodecError::invalid_data(format!(
                "SOT: Lsot {len} is not 10"
            )));
        }
        let sot = SotRecord {
            tile_index: self.reader.read_u16()?,
            tile_part_length: self.reader.read_u32()?,
            tile_part_index: self.reader.read_u8()?,
            num_tile_parts: self.reader.read_u8()?,
        };

        // Tile-part headers may carry further markers before SOD.
        loop {
            let at = self.reader.position();
            let hi = self.reader.read_u8()?;
            if hi != 0xFF {
                return Err(CodecError::invalid_data(format!(
                    "expected a marker in tile-part header at offset {at}"
                )));
            }
            let lo = self.reader.read_u8()?;
            match MarkerCode::try_from(lo).ok() {
                Some(MarkerCode::StartOfData) => return Ok(sot),
                _ if is_skippable(lo) => self.skip_segment(lo)?,
                _ => {
                    return Err(CodecError::invalid_data(format!(
                        "unexpected marker 0xFF{lo:02X} in tile-part header"
                    )))
                }
            }
        }
    }
}
