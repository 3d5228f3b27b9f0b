use crate::input::Input;
use rand::Rng;
use serde::{Serialize, de::DeserializeOwned};
use serde_json::{Number as JsonNumber, Value as JsonValue};
use std::marker::PhantomData;

/// Probability that the mutator descends into a given field or element.
const DEFAULT_JSON_FIELD_CHANGE_PROBABILITY: f64 = 0.3;
/// Probability that a leaf value is changed once reached.
const DEFAULT_JSON_VALUE_MUTATION_PROBABILITY: f64 = 0.5;
const DEFAULT_JSON_MAX_MUTATION_DEPTH: usize = 10;
/// Mutations that change nothing or no longer fit the target type are retried
/// this many times.
const DEFAULT_JSON_MAX_ATTEMPTS: usize = 8;
const MAX_ARRAY_GROWTH: usize = 1024;

/// Transforms an input into a new, possibly modified input.
///
/// With `None` the mutator starts from its own default input.
pub trait Mutator<I: Input, R: Rng + ?Sized> {
    fn mutate(&mut self, input_opt: Option<&I>, rng: &mut R) -> Result<I, anyhow::Error>;
}

/// Adds a small random value to one byte.
#[derive(Debug, Default, Clone, Copy)]
pub struct FlipSingleByteMutator;

impl<R: Rng + ?Sized> Mutator<Vec<u8>, R> for FlipSingleByteMutator {
    fn mutate(&mut self, input_opt: Option<&Vec<u8>>, rng: &mut R) -> Result<Vec<u8>, anyhow::Error> {
        let mut bytes = input_opt.cloned().unwrap_or_default();
        if bytes.is_empty() {
            bytes.push(0);
        }

        let delta = rng.random_range(1u8..=15u8);
        let index = rng.random_range(0..bytes.len());
        bytes[index] = bytes[index].wrapping_add(delta);
        Ok(bytes)
    }
}

/// Mutates any serde type through its JSON form.
///
/// Numbers are nudged within their width, booleans flipped, strings edited,
/// arrays grown or shrunk and nulls filled in. A mutation that leaves the JSON
/// unchanged or no longer deserializes into `S` is retried, and after the last
/// attempt the input is returned unchanged.
pub struct JsonFieldMutator<S> {
    target_type_name: &'static str,
    max_mutation_depth: usize,
    field_recurse_probability: f64,
    max_attempts: usize,
    _marker: PhantomData<S>,
}

impl<S> Default for JsonFieldMutator<S> {
    fn default() -> Self {
        Self::new(
            std::any::type_name::<S>(),
            DEFAULT_JSON_MAX_MUTATION_DEPTH,
            DEFAULT_JSON_FIELD_CHANGE_PROBABILITY,
        )
    }
}

impl<S> JsonFieldMutator<S> {
    pub fn new(
        target_type_name: &'static str,
        max_mutation_depth: usize,
        field_recurse_probability: f64,
    ) -> Self {
        Self {
            target_type_name,
            max_mutation_depth: if max_mutation_depth == 0 {
                DEFAULT_JSON_MAX_MUTATION_DEPTH
            } else {
                max_mutation_depth
            },
            field_recurse_probability: if field_recurse_probability <= 0.0
                || field_recurse_probability > 1.0
            {
                DEFAULT_JSON_FIELD_CHANGE_PROBABILITY
            } else {
                field_recurse_probability
            },
            max_attempts: DEFAULT_JSON_MAX_ATTEMPTS,
            _marker: PhantomData,
        }
    }

    fn mutate_json_value<R: Rng + ?Sized>(&self, value: &mut JsonValue, rng: &mut R, depth: usize) {
        if depth >= self.max_mutation_depth {
            return;
        }

        match value {
            JsonValue::Object(map) => {
                for (_key, val) in map.iter_mut() {
                    if rng.random_bool(self.field_recurse_probability) {
                        self.mutate_json_value(val, rng, depth + 1);
                    }
                }
            }
            JsonValue::Array(arr) => {
                for val in arr.iter_mut() {
                    if rng.random_bool(self.field_recurse_probability) {
                        self.mutate_json_value(val, rng, depth + 1);
                    }
                }
                if rng.random_bool(DEFAULT_JSON_VALUE_MUTATION_PROBABILITY) {
                    mutate_array_length(arr, rng);
                }
            }
            JsonValue::String(s) => {
                if !s.is_empty() && rng.random_bool(DEFAULT_JSON_VALUE_MUTATION_PROBABILITY) {
                    let mut chars: Vec<char> = s.chars().collect();
                    let idx = rng.random_range(0..chars.len());
                    chars[idx] = rng.random_range(32u8..127u8) as char;
                    *s = chars.into_iter().collect();
                }
            }
            JsonValue::Number(n) => {
                if rng.random_bool(DEFAULT_JSON_VALUE_MUTATION_PROBABILITY) {
                    *n = mutate_number(n, rng);
                }
            }
            JsonValue::Bool(b) => {
                if rng.random_bool(DEFAULT_JSON_VALUE_MUTATION_PROBABILITY) {
                    *b = !*b;
                }
            }
            JsonValue::Null => {
                if rng.random_bool(DEFAULT_JSON_VALUE_MUTATION_PROBABILITY) {
                    *value = if rng.random_bool(0.5) {
                        JsonValue::Number(JsonNumber::from(0u8))
                    } else {
                        JsonValue::Array(Vec::new())
                    };
                }
            }
        }
    }
}

/// Smallest unsigned width (u8, u32 or u64) that holds `v`.
fn width_max(v: u64) -> u64 {
    if v <= u64::from(u8::MAX) {
        u64::from(u8::MAX)
    } else if v <= u64::from(u32::MAX) {
        u64::from(u32::MAX)
    } else {
        u64::MAX
    }
}

/// Replaces or nudges a number without leaving the width its current value
/// fits in, so octets stay octets.
fn mutate_number<R: Rng + ?Sized>(n: &JsonNumber, rng: &mut R) -> JsonNumber {
    if let Some(v) = n.as_u64() {
        let max = width_max(v);
        return match rng.random_range(0u8..4) {
            0 => JsonNumber::from(rng.random::<u8>()),
            1 => JsonNumber::from(rng.random_range(0..=max)),
            _ => {
                let magnitude = rng.random_range(1i128..=5);
                let delta = if rng.random_bool(0.5) { magnitude } else { -magnitude };
                let modulus = i128::from(max) + 1;
                let wrapped = (i128::from(v) + delta).rem_euclid(modulus);
                JsonNumber::from(u64::try_from(wrapped).unwrap_or(0))
            }
        };
    }
    if let Some(v) = n.as_i64() {
        return JsonNumber::from(v.saturating_add(rng.random_range(-5i64..=5i64)));
    }
    n.as_f64()
        .map(|v| v + rng.random_range(-1.0..1.0))
        .and_then(JsonNumber::from_f64)
        .unwrap_or_else(|| JsonNumber::from(0u8))
}

fn mutate_array_length<R: Rng + ?Sized>(arr: &mut Vec<JsonValue>, rng: &mut R) {
    if !arr.is_empty() && rng.random_bool(0.5) {
        let idx = rng.random_range(0..arr.len());
        arr.remove(idx);
    } else if arr.len() < MAX_ARRAY_GROWTH {
        let element = match arr.first() {
            Some(JsonValue::Number(_)) | None => JsonValue::Number(JsonNumber::from(rng.random::<u8>())),
            Some(other) => other.clone(),
        };
        let idx = rng.random_range(0..=arr.len());
        arr.insert(idx, element);
    }
}

impl<S, R> Mutator<S, R> for JsonFieldMutator<S>
where
    S: Input + Serialize + DeserializeOwned + Default,
    R: Rng + ?Sized,
{
    fn mutate(&mut self, input_opt: Option<&S>, rng: &mut R) -> Result<S, anyhow::Error> {
        let original = input_opt.cloned().unwrap_or_default();
        let json = serde_json::to_value(&original).map_err(|e| {
            anyhow::anyhow!("Failed to serialize {} to JSON: {}", self.target_type_name, e)
        })?;

        for _ in 0..self.max_attempts {
            let mut candidate = json.clone();
            self.mutate_json_value(&mut candidate, rng, 0);
            if candidate == json {
                continue;
            }
            match serde_json::from_value::<S>(candidate) {
                Ok(mutated) => return Ok(mutated),
                Err(e) => tracing::trace!(
                    "Mutated JSON no longer fits {}: {}",
                    self.target_type_name,
                    e
                ),
            }
        }
        Ok(original)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::message::{DestinationSize, StructuredMessage};
    use crate::seeds::structured_seeds;
    use rand_chacha::ChaCha8Rng;
    use std::collections::HashSet;
    use rand_core::SeedableRng;

    #[test]
    fn flip_single_byte_mutator_changes_exactly_one_byte() {
        let mut mutator = FlipSingleByteMutator;
        let mut rng = ChaCha8Rng::from_seed([0u8; 32]);
        let initial: Vec<u8> = vec![10, 20, 30];

        let mutated = mutator.mutate(Some(&initial), &mut rng).unwrap();
        assert_eq!(mutated.len(), initial.len());
        let differing = initial.iter().zip(&mutated).filter(|(a, b)| a != b).count();
        assert_eq!(differing, 1);
    }

    #[test]
    fn flip_single_byte_mutator_handles_empty_and_none_input() {
        let mut mutator = FlipSingleByteMutator;
        let mut rng = ChaCha8Rng::from_seed([1u8; 32]);

        let from_empty = mutator.mutate(Some(&Vec::new()), &mut rng).unwrap();
        assert_eq!(from_empty.len(), 1);
        assert_ne!(from_empty[0], 0);

        let from_none: Vec<u8> = mutator.mutate(None, &mut rng).unwrap();
        assert_eq!(from_none.len(), 1);
    }

    #[test]
    fn json_field_mutator_changes_structured_messages() {
        let mut mutator = JsonFieldMutator::<StructuredMessage>::default();
        let mut rng = ChaCha8Rng::from_seed([42u8; 32]);
        let (_, initial) = structured_seeds().remove(0);

        let mut changed = 0;
        for _ in 0..200 {
            let mutated = mutator.mutate(Some(&initial), &mut rng).unwrap();
            if mutated != initial {
                changed += 1;
            }
        }
        assert!(changed > 0, "no mutation over 200 attempts");
    }

    #[test]
    fn json_field_mutator_starts_from_default_without_input() {
        let mut mutator = JsonFieldMutator::<StructuredMessage>::new("StructuredMessage", 0, 2.0);
        assert_eq!(mutator.max_mutation_depth, DEFAULT_JSON_MAX_MUTATION_DEPTH);
        assert_eq!(
            mutator.field_recurse_probability,
            DEFAULT_JSON_FIELD_CHANGE_PROBABILITY
        );

        let mut rng = ChaCha8Rng::from_seed([43u8; 32]);
        for _ in 0..50 {
            let _ = mutator.mutate(None, &mut rng).unwrap();
        }
    }

    #[test]
    fn null_fields_can_be_filled_in() {
        let mut mutator = JsonFieldMutator::<StructuredMessage>::new("StructuredMessage", 10, 1.0);
        let mut rng = ChaCha8Rng::from_seed([7u8; 32]);
        let filled = (0..200)
            .map(|_| mutator.mutate(None, &mut rng).unwrap())
            .any(|m| m.header.source_node_id.is_some() || m.payload.vendor_id.is_some());
        assert!(filled);
    }

    #[test]
    fn json_field_mutator_rarely_returns_input_unchanged() {
        let mut mutator = JsonFieldMutator::<StructuredMessage>::default();
        let mut rng = ChaCha8Rng::from_seed([11u8; 32]);
        for (name, seed) in structured_seeds() {
            let unchanged = (0..2000)
                .filter(|_| mutator.mutate(Some(&seed), &mut rng).unwrap() == seed)
                .count();
            assert!(unchanged < 200, "{name}: {unchanged} of 2000 unchanged");
        }
    }

    #[test]
    fn every_destination_size_is_reachable() {
        let mut mutator = JsonFieldMutator::<StructuredMessage>::default();
        let mut rng = ChaCha8Rng::from_seed([12u8; 32]);
        let seeds = structured_seeds();
        let mut seen = HashSet::new();
        for i in 0..6000 {
            let (_, seed) = &seeds[i % seeds.len()];
            seen.insert(mutator.mutate(Some(seed), &mut rng).unwrap().header.flag_dsiz);
        }
        for size in [
            DestinationSize::Absent,
            DestinationSize::NodeId,
            DestinationSize::GroupId,
            DestinationSize::Reserved,
        ] {
            assert!(seen.contains(&size), "{size:?} never produced");
        }
    }

    #[test]
    fn numbers_stay_within_their_width() {
        let mut rng = ChaCha8Rng::from_seed([13u8; 32]);
        for _ in 0..5000 {
            let byte = mutate_number(&JsonNumber::from(250u8), &mut rng);
            assert!(byte.as_u64().is_some_and(|v| v <= u64::from(u8::MAX)));
            let word = mutate_number(&JsonNumber::from(0x0534_8af8u32), &mut rng);
            assert!(word.as_u64().is_some_and(|v| v <= u64::from(u32::MAX)));
        }
        assert!(mutate_number(&JsonNumber::from(u64::MAX), &mut rng).as_u64().is_some());
    }

    #[test]
    fn array_length_mutation_stays_bounded() {
        let mut rng = ChaCha8Rng::from_seed([9u8; 32]);
        let mut arr = Vec::new();
        for _ in 0..5000 {
            mutate_array_length(&mut arr, &mut rng);
        }
        assert!(arr.len() <= MAX_ARRAY_GROWTH);
        assert!(arr.iter().all(|v| v.as_u64().is_some_and(|n| n <= 255)));
    }
}
