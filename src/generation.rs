//! Autoregressive generation: predict, sample, append, slide.

use rand::Rng;
use std::collections::VecDeque;
use std::io;
use thiserror::Error;

use crate::data::{encode_window, DataError};
use crate::layers::RecurrentCell;
use crate::models::sequence_model::SequenceModel;
use crate::sampling::{sample_with_temperature, SamplingError};

#[derive(Debug, Error)]
pub enum GenerationError {
    #[error("seed has {actual} IDs, the model reads windows of {expected}")]
    SeedLength { expected: usize, actual: usize },
    #[error(transparent)]
    Data(#[from] DataError),
    #[error(transparent)]
    Sampling(#[from] SamplingError),
    #[error("failed to emit generated ID: {0}")]
    Sink(#[from] io::Error),
}

/// Seed window and the IDs generated after it.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Generation {
    pub seed: Vec<usize>,
    pub generated: Vec<usize>,
}

impl Generation {
    /// Seed followed by every generated ID.
    pub fn full_sequence(&self) -> Vec<usize> {
        self.seed.iter().chain(&self.generated).cloned().collect()
    }
}

/// Generates `predictions` IDs after `seed`, handing each one to `sink` as soon as it is drawn.
pub fn generate<C, R, F>(
    model: &SequenceModel<C>,
    seed: &[usize],
    predictions: usize,
    temperature: f64,
    rng: &mut R,
    mut sink: F,
) -> Result<Generation, GenerationError>
where
    C: RecurrentCell,
    R: Rng + ?Sized,
    F: FnMut(usize) -> io::Result<()>,
{
    let shape = model.shape();
    if seed.len() != shape.sentence_length {
        return Err(GenerationError::SeedLength { expected: shape.sentence_length, actual: seed.len() });
    }

    let mut window: VecDeque<usize> = seed.iter().cloned().collect();
    let mut generated = Vec::with_capacity(predictions);

    for _ in 0..predictions {
        let encoded = encode_window(window.make_contiguous(), shape.vocab_size)?;
        let probs = model.predict(&encoded);
        let next_id = sample_with_temperature(probs.view(), temperature, rng)?;

        sink(next_id)?;
        generated.push(next_id);

        window.pop_front();
        window.push_back(next_id);
    }

    Ok(Generation { seed: seed.to_vec(), generated })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::layers::gru_cell::GRUCell;
    use crate::models::sequence_model::ModelShape;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    fn model() -> SequenceModel<GRUCell> {
        let shape = ModelShape { sentence_length: 3, vocab_size: 6, hidden_size: 5 };
        SequenceModel::new(shape, 0.2, &mut StdRng::seed_from_u64(3))
    }

    #[test]
    fn test_generates_requested_number_of_ids() {
        let model = model();
        let mut streamed = Vec::new();
        let generation = generate(&model, &[1, 2, 3], 10, 0.5, &mut StdRng::seed_from_u64(1), |id| {
            streamed.push(id);
            Ok(())
        }).unwrap();

        assert_eq!(generation.seed, vec![1, 2, 3]);
        assert_eq!(generation.generated.len(), 10);
        assert_eq!(streamed, generation.generated);
        assert!(generation.generated.iter().all(|&id| id < 6));
        assert_eq!(generation.full_sequence().len(), 13);
    }

    #[test]
    fn test_zero_predictions() {
        let generation = generate(&model(), &[0, 0, 1], 0, 0.2, &mut StdRng::seed_from_u64(1), |_| Ok(())).unwrap();
        assert!(generation.generated.is_empty());
    }

    #[test]
    fn test_same_seed_same_generation() {
        let model = model();
        let run = |seed| {
            generate(&model, &[4, 1, 2], 20, 0.5, &mut StdRng::seed_from_u64(seed), |_| Ok(()))
                .unwrap()
                .generated
        };
        assert_eq!(run(7), run(7));
    }

    #[test]
    fn test_cold_temperature_follows_argmax() {
        let model = model();
        let generation = generate(&model, &[1, 2, 3], 5, 1e-6, &mut StdRng::seed_from_u64(0), |_| Ok(())).unwrap();

        let mut window = vec![1, 2, 3];
        for &id in &generation.generated {
            let probs = model.predict(&encode_window(&window, 6).unwrap());
            assert_eq!(id, crate::utils::argmax(probs.view()));
            window.remove(0);
            window.push(id);
        }
    }

    #[test]
    fn test_rejects_bad_seeds() {
        let model = model();
        let short = generate(&model, &[1, 2], 3, 0.5, &mut StdRng::seed_from_u64(0), |_| Ok(()));
        assert!(matches!(short, Err(GenerationError::SeedLength { expected: 3, actual: 2 })));

        let out_of_range = generate(&model, &[1, 2, 9], 3, 0.5, &mut StdRng::seed_from_u64(0), |_| Ok(()));
        assert!(matches!(out_of_range, Err(GenerationError::Data(DataError::IdOutOfRange { id: 9, .. }))));
    }

    #[test]
    fn test_sink_errors_stop_generation() {
        let result = generate(&model(), &[1, 2, 3], 3, 0.5, &mut StdRng::seed_from_u64(0), |_| {
            Err(io::Error::new(io::ErrorKind::BrokenPipe, "closed"))
        });
        assert!(matches!(result, Err(GenerationError::Sink(_))));
    }
}
