//! Seeded random block forests.
//!
//! Draws from every kind tag (aliases included), sprinkles in unknown
//! kinds, out-of-range and textual field values, and nests loops a couple
//! of levels deep. Everything it produces must compile and terminate.

use blockstage_core::BlockNode;
use rand::seq::SliceRandom;
use rand::Rng;

const SIMPLE_KINDS: &[&str] = &[
    "move",
    "robot_maju",
    "gerak_maju",
    "turn",
    "robot_putar",
    "turn-right",
    "putar_kanan",
    "turn-left",
    "putar_kiri",
    "wait",
    "tunggu",
    "say",
    "robot_bilang",
    "start-event",
];

const COMPOUND_KINDS: &[&str] = &[
    "repeat-n",
    "robot_ulangi",
    "kontrol_ulangi",
    "repeat-forever",
    "kontrol_selamanya",
    "if-condition",
    "kontrol_jika",
    "if-goal-reached",
    "robot_jika_finish",
];

const CONDITIONS: &[&str] = &["goal-reached", "finish", "true", "false", "sensor"];

/// Shape limits for generated forests.
#[derive(Debug, Clone, Copy)]
pub struct FuzzShape {
    pub max_len: usize,
    pub max_depth: u32,
}

impl Default for FuzzShape {
    fn default() -> Self {
        Self {
            max_len: 6,
            max_depth: 2,
        }
    }
}

/// Generates one random root sequence.
pub fn random_forest<R: Rng>(rng: &mut R, shape: FuzzShape) -> Vec<BlockNode> {
    sequence(rng, shape, shape.max_depth)
}

fn sequence<R: Rng>(rng: &mut R, shape: FuzzShape, depth: u32) -> Vec<BlockNode> {
    let len = rng.gen_range(0..=shape.max_len);
    (0..len).map(|_| node(rng, shape, depth)).collect()
}

fn node<R: Rng>(rng: &mut R, shape: FuzzShape, depth: u32) -> BlockNode {
    // Occasional garbage kind
    if rng.gen_bool(0.05) {
        return BlockNode::new("teleport").with_field("steps", 3.0);
    }

    if depth > 0 && rng.gen_bool(0.25) {
        let kind = pick(rng, COMPOUND_KINDS);
        let body = sequence(rng, shape, depth - 1);
        let node = BlockNode::new(kind).with_body(body);
        return match kind {
            "repeat-n" | "robot_ulangi" | "kontrol_ulangi" => {
                node.with_field("times", rng.gen_range(-2.0..8.0_f64).round())
            }
            "if-condition" | "kontrol_jika" => node.with_field("condition", pick(rng, CONDITIONS)),
            _ => node,
        };
    }

    let kind = pick(rng, SIMPLE_KINDS);
    let node = BlockNode::new(kind);
    match kind {
        "move" | "robot_maju" | "gerak_maju" => node.with_field("steps", rng.gen_range(-1.0..6.0_f64)),
        "turn" | "robot_putar" => node
            .with_field("degrees", rng.gen_range(0.0..400.0_f64))
            .with_field("direction", pick(rng, &["left", "right", "up"])),
        "turn-right" | "putar_kanan" | "turn-left" | "putar_kiri" => {
            node.with_field("degrees", *[45.0, 90.0, 180.0, 270.0].choose(rng).unwrap_or(&90.0))
        }
        "wait" | "tunggu" => node.with_field("seconds", rng.gen_range(0.0..3.0_f64)),
        "say" | "robot_bilang" => node.with_field("text", "Halo"),
        _ => node,
    }
}

fn pick<R: Rng>(rng: &mut R, options: &[&'static str]) -> &'static str {
    options.choose(rng).copied().unwrap_or("move")
}

#[cfg(test)]
mod tests {
    use super::*;
    use blockstage_core::compile;
    use proptest::prelude::*;
    use rand::SeedableRng;
    use rand_chacha::ChaCha8Rng;

    #[test]
    fn test_same_seed_same_forest() {
        let a = random_forest(&mut ChaCha8Rng::seed_from_u64(9), FuzzShape::default());
        let b = random_forest(&mut ChaCha8Rng::seed_from_u64(9), FuzzShape::default());
        assert_eq!(a, b);
    }

    proptest! {
        #[test]
        fn prop_any_seed_compiles_within_depth(seed in any::<u64>()) {
            let forest = random_forest(&mut ChaCha8Rng::seed_from_u64(seed), FuzzShape::default());
            let compilation = compile(&forest);
            // Root level counts as 1
            prop_assert!(compilation.program.depth() <= 3);
        }
    }
}
