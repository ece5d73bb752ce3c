//! Packet sequencing in the five progression orders (Annex B.12). The
//! sequence is a deterministic total order over (layer, resolution,
//! component, precinct) coordinates; packet assembly and parsing both walk
//! it so the codestream is byte-deterministic.

use crate::config::ProgressionOrder;

/// One packet coordinate.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PacketCoord {
    pub layer: u32,
    pub resolution: u8,
    pub component: u16,
    pub precinct: u32,
}

/// Geometry the sequencer iterates over: per-component resolution counts
/// and per-(component, resolution) precinct counts.
#[derive(Debug, Clone)]
pub struct ProgressionDims {
    pub num_layers: u32,
    /// `precincts[c][r]` = precinct count of component c at resolution r;
    /// the inner length is that component's resolution count.
    pub precincts: Vec<Vec<u32>>,
}

impl ProgressionDims {
    fn max_resolutions(&self) -> u8 {
        self.precincts.iter().map(|r| r.len() as u8).max().unwrap_or(0)
    }

    fn max_precincts(&self) -> u32 {
        self.precincts
            .iter()
            .flat_map(|r| r.iter().copied())
            .max()
            .unwrap_or(0)
    }

    fn precincts_at(&self, component: u16, resolution: u8) -> u32 {
        self.precincts
            .get(component as usize)
            .and_then(|r| r.get(resolution as usize).copied())
            .unwrap_or(0)
    }
}

/// Generate the full packet sequence of one tile in the given order.
pub fn packet_sequence(order: ProgressionOrder, dims: &ProgressionDims) -> Vec<PacketCoord> {
    let num_components = dims.precincts.len() as u16;
    let max_res = dims.max_resolutions();
    let max_prec = dims.max_precincts();
    let mut out = Vec::new();

    let mut push = |layer: u32, resolution: u8, component: u16, precinct: u32| {
        if precinct < dims.precincts_at(component, resolution) {
            out.push(PacketCoord {
                layer,
                resolution,
                component,
                precinct,
            });
        }
    };

    match order {
        ProgressionOrder::Lrcp => {
            for l in 0..dims.num_layers {
                for r in 0..max_res {
                    for c in 0..num_components {
                        for p in 0..max_prec {
                            push(l, r, c, p);
                        }
                    }
                }
            }
        }
        ProgressionOrder::Rlcp => {
            for r in 0..max_res {
                for l in 0..dims.num_layers {
                    for c in 0..num_components {
                        for p in 0..max_prec {
                            push(l, r, c, p);
                        }
                    }
                }
            }
        }
        ProgressionOrder::Rpcl => {
            for r in 0..max_res {
                for p in 0..max_prec {
                    for c in 0..num_components {
                        for l in 0..dims.num_layers {
                            push(l, r, c, p);
                        }
                    }
                }
            }
        }
        ProgressionOrder::Pcrl => {
            for p in 0..max_prec {
                for c in 0..num_components {
                    for r in 0..max_res {
                        for l in 0..dims.num_layers {
                            push(l, r, c, p);
                        }
                    }
                }
            }
        }
        ProgressionOrder::Cprl => {
            for c in 0..num_components {
                for p in 0..max_prec {
                    for r in 0..max_res {
                        for l in 0..dims.num_layers {
                            push(l, r, c, p);
                        }
                    }
                }
            }
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn uniform_dims() -> ProgressionDims {
        // Two components, three resolutions each, one precinct per
        // resolution, two layers.
        ProgressionDims {
            num_layers: 2,
            precincts: vec![vec![1, 1, 1], vec![1, 1, 1]],
        }
    }

    #[test]
    fn sequence_covers_every_coordinate_once() {
        let dims = uniform_dims();
        for order in [
            ProgressionOrder::Lrcp,
            ProgressionOrder::Rlcp,
            ProgressionOrder::Rpcl,
            ProgressionOrder::Pcrl,
            ProgressionOrder::Cprl,
        ] {
            let seq = packet_sequence(order, &dims);
            assert_eq!(seq.len(), 2 * 3 * 2, "{order:?}");
            let mut seen = std::collections::BTreeSet::new();
            for pc in &seq {
                assert!(seen.insert((pc.layer, pc.resolution, pc.component, pc.precinct)));
            }
        }
    }

    #[test]
    fn lrcp_iterates_layers_outermost() {
        let seq = packet_sequence(ProgressionOrder::Lrcp, &uniform_dims());
        let first_half: Vec<u32> = seq[..6].iter().map(|p| p.layer).collect();
        assert_eq!(first_half, vec![0; 6]);
        assert_eq!(seq[6].layer, 1);
        // Within a layer, resolutions ascend.
        assert_eq!(seq[0].resolution, 0);
        assert_eq!(seq[2].resolution, 1);
    }

    #[test]
    fn rlcp_iterates_resolutions_outermost() {
        let seq = packet_sequence(ProgressionOrder::Rlcp, &uniform_dims());
        let first: Vec<u8> = seq[..4].iter().map(|p| p.resolution).collect();
        assert_eq!(first, vec![0; 4]);
        assert_eq!(seq[4].resolution, 1);
    }

    #[test]
    fn cprl_iterates_components_outermost() {
        let seq = packet_sequence(ProgressionOrder::Cprl, &uniform_dims());
        assert!(seq[..6].iter().all(|p| p.component == 0));
        assert!(seq[6..].iter().all(|p| p.component == 1));
    }

    #[test]
    fn ragged_component_resolutions() {
        // Component 1 has fewer resolutions; its missing coordinates are
        // skipped in every order.
        let dims = ProgressionDims {
            num_layers: 1,
            precincts: vec![vec![1, 1, 1], vec![1]],
        };
        for order in [
            ProgressionOrder::Lrcp,
            ProgressionOrder::Rpcl,
            ProgressionOrder::Pcrl,
        ] {
            let seq = packet_sequence(order, &dims);
            assert_eq!(seq.len(), 4, "{order:?}");
            assert_eq!(
                seq.iter()
                    .filter(|p| p.component == 1)
                    .count(),
                1
            );
        }
    }
}
