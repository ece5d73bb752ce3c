/*!
# j2kcodec

`j2kcodec` is a pure Rust implementation of the JPEG 2000 codestream
formats: ISO/IEC 15444-1 (Part 1), the Part 2 extensions it builds on
(arbitrary wavelet kernels, trellis-coded quantization, ADS signalling) and
ISO/IEC 15444-15 (HTJ2K).

## Subsystems

- **Tier-1**: `mq_coder` (Annex C arithmetic coding), `context` (Annex D
  context modelling), `bit_plane_coder` (EBCOT three-pass coding) and
  `ht_block_coder` (FBCOT cleanup and refinement passes).
- **Tier-2**: `tag_tree`, `packet` (Annex B.10 packet headers),
  `progression` (the five packet orders) and `rate_control` (truncation
  points and layer forming).
- **Transforms**: `dwt` (5/3, 9/7, Haar lifting plus Part 2 convolution),
  `quantization` (scalar/deadzone/expounded and the step-size codec),
  `tcq` (Part 2 trellis quantization) and `colour` (RCT/ICT).
- **Codestream**: `markers`, `headers`, `parser`, `writer`.
- **Pipelines**: `encoder` and `decoder` tie the stages together, with
  optional per-code-block parallelism and cooperative cancellation.

## Entry points

```no_run
use j2kcodec::{Decoder, Encoder, EncoderConfig, Image};

let image = Image::default();
let encoder = Encoder::new(EncoderConfig::default())?;
let codestream = encoder.encode(&image)?;
let decoded = Decoder::default().decode(&codestream)?;
# Ok::<(), j2kcodec::CodecError>(())
```

The core is stateless across invocations; the only shared global is the
immutable MQ probability table.
*/

pub mod bit_io;
pub mod bit_plane_coder;
pub mod buffer_pool;
pub mod colour;
pub mod config;
pub mod context;
pub mod decoder;
pub mod dwt;
pub mod encoder;
pub mod error;
pub mod headers;
pub mod ht_block_coder;
pub mod image;
pub mod markers;
pub mod mq_coder;
pub mod packet;
pub mod parser;
pub mod progression;
pub mod quantization;
pub mod rate_control;
pub mod stream;
pub mod tag_tree;
pub mod tcq;
pub mod tile_geom;
pub mod writer;

pub use config::{
    BitrateMode, CancellationToken, DecoderConfig, EncoderConfig, ProgressionOrder,
};
pub use decoder::Decoder;
pub use encoder::Encoder;
pub use error::{CodecError, Result};
pub use image::{ComponentInfo, Image, SubbandOrientation};

#[cfg(test)]
mod tests {
    use super::*;

    /// End-to-end: an 8x8 constant image survives the full pipeline.
    #[test]
    fn constant_image_round_trip() {
        let image = Image {
            width: 8,
            height: 8,
            components: vec![ComponentInfo::default()],
            planes: vec![vec![128; 64]],
        };
        let bytes = Encoder::new(EncoderConfig {
            decomposition_levels: 2,
            ..Default::default()
        })
        .unwrap()
        .encode(&image)
        .unwrap();
        let decoded = Decoder::default().decode(&bytes).unwrap();
        assert_eq!(decoded.planes, image.planes);
    }

    /// The codec is stateless: the same encoder instance produces identical
    /// codestreams back to back.
    #[test]
    fn encoder_reuse_is_deterministic() {
        let image = Image {
            width: 16,
            height: 12,
            components: vec![ComponentInfo::default()],
            planes: vec![(0..192).map(|i| i % 251).collect()],
        };
        let encoder = Encoder::new(EncoderConfig::default()).unwrap();
        let a = encoder.encode(&image).unwrap();
        let b = encoder.encode(&image).unwrap();
        assert_eq!(a, b);
    }
}
