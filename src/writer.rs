//! Marker-segment emission (Annex A). Every length field is computed from
//! the payload actually written.

use crate::error::Result;
use crate::headers::{
    AdsRecord, CapRecord, CocRecord, CodRecord, CpfRecord, QcdRecord, QccRecord, SizRecord,
    SotRecord,
};
use crate::markers::MarkerCode;
use crate::stream::StreamWriter;

pub struct CodestreamWriter {
    out: StreamWriter,
}

impl Default for CodestreamWriter {
    fn default() -> Self {
        Self::new()
    }
}

impl CodestreamWriter {
    pub fn new() -> Self {
        Self {
            out: StreamWriter::new(),
        }
    }

    pub fn len(&self) -> usize {
        self.out.len()
    }

    pub fn is_empty(&self) -> bool {
        self.out.is_empty()
    }

    pub fn into_bytes(self) -> Vec<u8> {
        self.out.into_bytes()
    }

    pub fn write_soc(&mut self) {
        self.out.write_marker(MarkerCode::StartOfCodestream);
    }

    pub fn write_eoc(&mut self) {
        self.out.write_marker(MarkerCode::EndOfCodestream);
    }

    pub fn write_sod(&mut self) {
        self.out.write_marker(MarkerCode::StartOfData);
    }

    pub fn write_bytes(&mut self, bytes: &[u8]) {
        self.out.write_bytes(bytes);
    }

    pub fn write_siz(&mut self, siz: &SizRecord) -> Result<()> {
        siz.validate()?;
        self.out.write_marker(MarkerCode::ImageAndTileSize);
        self.out.write_u16(38 + 3 * siz.components.len() as u16);
        self.out.write_u16(siz.rsiz);
        self.out.write_u32(siz.width);
        self.out.write_u32(siz.height);
        self.out.write_u32(siz.x_offset);
        self.out.write_u32(siz.y_offset);
        self.out.write_u32(siz.tile_width);
        self.out.write_u32(siz.tile_height);
        self.out.write_u32(siz.tile_x_offset);
        self.out.write_u32(siz.tile_y_offset);
        self.out.write_u16(siz.components.len() as u16);
        for comp in &siz.components {
            let ssiz = (comp.bit_depth - 1) | if comp.signed { 0x80 } else { 0 };
            self.out.write_u8(ssiz);
            self.out.write_u8(comp.dx);
            self.out.write_u8(comp.dy);
        }
        Ok(())
    }

    fn write_spcod(&mut self, cod: &CodRecord) {
        self.out.write_u8(cod.decomposition_levels);
        self.out.write_u8(cod.code_block_width_exp - 2);
        self.out.write_u8(cod.code_block_height_exp - 2);
        self.out.write_u8(cod.code_block_style);
        self.out.write_u8(cod.transform);
        for &p in &cod.precinct_sizes {
            self.out.write_u8(p);
        }
    }

    pub fn write_cod(&mut self, cod: &CodRecord) -> Result<()> {
        cod.validate()?;
        self.out.write_marker(MarkerCode::CodingStyleDefault);
        self.out.write_u16(12 + cod.precinct_sizes.len() as u16);
        let scod = if cod.precinct_sizes.is_empty() {
            cod.coding_style & !0x01
        } else {
            cod.coding_style | 0x01
        };
        self.out.write_u8(scod);
        self.out.write_u8(cod.progression_order.cod_value());
        self.out.write_u16(cod.num_layers);
        self.out.write_u8(cod.mct);
        self.write_spcod(cod);
        Ok(())
    }

    pub fn write_coc(&mut self, coc: &CocRecord, num_components: u16) -> Result<()> {
        coc.cod.validate()?;
        self.out.write_marker(MarkerCode::CodingStyleComponent);
        let comp_bytes: u16 = if num_components < 257 { 1 } else { 2 };
        self.out
            .write_u16(2 + comp_bytes + 1 + 5 + coc.cod.precinct_sizes.len() as u16);
        if comp_bytes == 1 {
            self.out.write_u8(coc.component as u8);
        } else {
            self.out.write_u16(coc.component);
        }
        let scoc = if coc.cod.precinct_sizes.is_empty() { 0 } else { 1 };
        self.out.write_u8(scoc);
        self.write_spcod(&coc.cod);
        Ok(())
    }

    fn write_quant_payload(&mut self, qcd: &QcdRecord) {
        self.out.write_u8((qcd.guard_bits << 5) | qcd.style);
        for &(exponent, mantissa) in &qcd.steps {
            if qcd.style == 0 {
                self.out.write_u8(exponent << 3);
            } else {
                self.out
                    .write_u16(((exponent as u16) << 11) | (mantissa & 0x07FF));
            }
        }
    }

    fn quant_payload_len(qcd: &QcdRecord) -> u16 {
        let per_step: u16 = if qcd.style == 0 { 1 } else { 2 };
        3 + per_step * qcd.steps.len() as u16
    }

    pub fn write_qcd(&mut self, qcd: &QcdRecord) -> Result<()> {
        qcd.validate()?;
        self.out.write_marker(MarkerCode::QuantizationDefault);
        self.out.write_u16(Self::quant_payload_len(qcd));
        self.write_quant_payload(qcd);
        Ok(())
    }

    pub fn write_qcc(&mut self, qcc: &QccRecord, num_components: u16) -> Result<()> {
        qcc.qcd.validate()?;
        self.out.write_marker(MarkerCode::QuantizationComponent);
        let comp_bytes: u16 = if num_components < 257 { 1 } else { 2 };
        self.out
            .write_u16(Self::quant_payload_len(&qcc.qcd) + comp_bytes);
        if comp_bytes == 1 {
            self.out.write_u8(qcc.component as u8);
        } else {
            self.out.write_u16(qcc.component);
        }
        self.write_quant_payload(&qcc.qcd);
        Ok(())
    }

    pub fn write_cap(&mut self, cap: &CapRecord) -> Result<()> {
        self.out.write_marker(MarkerCode::Capability);
        self.out.write_u16(6 + 2 * cap.ccap.len() as u16);
        self.out.write_u32(cap.pcap);
        for &c in &cap.ccap {
            self.out.write_u16(c);
        }
        Ok(())
    }

    pub fn write_cpf(&mut self, cpf: &CpfRecord) -> Result<()> {
        self.out.write_marker(MarkerCode::CorrespondingProfile);
        self.out.write_u16(4);
        self.out.write_u16(cpf.pcpf);
        Ok(())
    }

    pub fn write_ads(&mut self, ads: &AdsRecord) -> Result<()> {
        ads.validate()?;
        self.out
            .write_marker(MarkerCode::ArbitraryDecompositionStyle);
        self.out.write_u16(5 + 2 * ads.nodes.len() as u16);
        self.out.write_u8(ads.index);
        self.out.write_u8(ads.decomposition_order);
        self.out.write_u8(ads.max_levels);
        for node in &ads.nodes {
            let flags = node.horizontal as u8 | ((node.vertical as u8) << 1);
            self.out.write_u8(flags);
            self.out.write_u8(node.kernel_index);
        }
        Ok(())
    }

    /// Write SOT and return the byte offset of its Psot field so the caller
    /// can patch the tile-part length once known.
    pub fn write_sot(&mut self, sot: &SotRecord) -> usize {
        self.out.write_marker(MarkerCode::StartOfTile);
        self.out.write_u16(10);
        self.out.write_u16(sot.tile_index);
        let psot_offset = self.out.len();
        self.out.write_u32(sot.tile_part_length);
        self.out.write_u8(sot.tile_part_index);
        self.out.write_u8(sot.num_tile_parts);
        psot_offset
    }

    pub fn patch_u32(&mut self, offset: usize, value: u32) {
        self.out.patch_u32(offset, value);
    }
}
