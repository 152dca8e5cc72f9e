//! Integer log loading, sliding-window construction and one-hot encoding.

use std::fs;
use std::num::ParseIntError;
use std::path::{Path, PathBuf};

use ndarray::{s, Array2, Array3, Axis};
use thiserror::Error;
use tracing::{debug, info};

/// Sentinel used to left-pad windows that start before the first element.
pub const PAD_ID: usize = 0;

/// IDs reserved on top of the largest observed one ("unknown" and "none").
pub const RESERVED_IDS: usize = 2;

#[derive(Debug, Error)]
pub enum DataError {
    #[error("cannot read sequence file {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("line {line}: {value:?} is not a non-negative integer ID")]
    Parse {
        line: usize,
        value: String,
        #[source]
        source: ParseIntError,
    },
    #[error("sequence is empty")]
    EmptySequence,
    #[error("sentence length and step must be positive (got {sentence_length} and {step})")]
    InvalidWindow { sentence_length: usize, step: usize },
    #[error("sequence of {len} IDs is too short for windows of {sentence_length}")]
    SequenceTooShort { len: usize, sentence_length: usize },
    #[error("ID {id} is outside the vocabulary of size {vocab_size}")]
    IdOutOfRange { id: usize, vocab_size: usize },
}

/// Parses one ID per line; blank lines are skipped.
pub fn parse_sequence(text: &str) -> Result<Vec<usize>, DataError> {
    text.lines()
        .enumerate()
        .filter(|(_, line)| !line.trim().is_empty())
        .map(|(i, line)| {
            let value = line.trim();
            value.parse::<usize>().map_err(|source| DataError::Parse {
                line: i + 1,
                value: value.to_string(),
                source,
            })
        })
        .collect()
}

pub fn load_sequence<P: AsRef<Path>>(path: P) -> Result<Vec<usize>, DataError> {
    let path = path.as_ref();
    let text = fs::read_to_string(path).map_err(|source| DataError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    let sequence = parse_sequence(&text)?;
    debug!(path = %path.display(), ids = sequence.len(), "loaded sequence");
    Ok(sequence)
}

/// `max(sequence) + 2`, leaving room for the two reserved IDs.
pub fn vocab_size(sequence: &[usize]) -> Result<usize, DataError> {
    sequence.iter()
        .max()
        .map(|&max| max + RESERVED_IDS)
        .ok_or(DataError::EmptySequence)
}

/// Aligned training windows and the ID following each of them.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Windows {
    pub sentence_length: usize,
    pub sentences: Vec<Vec<usize>>,
    pub next_ids: Vec<usize>,
}

/// Number of (window, next-ID) pairs `build_windows` yields.
pub fn window_count(len: usize, sentence_length: usize, step: usize) -> usize {
    ceil_div(sentence_length, step) + ceil_div(len.saturating_sub(sentence_length), step)
}

// `n + step - 1` would overflow for huge steps.
fn ceil_div(n: usize, step: usize) -> usize {
    n / step + usize::from(n % step != 0)
}

/// Cuts the sequence into windows of `sentence_length`.
///
/// The first windows ramp up from the start of the sequence, left-padded
/// with [`PAD_ID`], so the very first element is also a prediction target.
/// Full-length windows then slide forward by `step`.
pub fn build_windows(sequence: &[usize], sentence_length: usize, step: usize) -> Result<Windows, DataError> {
    if sentence_length == 0 || step == 0 {
        return Err(DataError::InvalidWindow { sentence_length, step });
    }
    if sequence.len() <= sentence_length {
        return Err(DataError::SequenceTooShort { len: sequence.len(), sentence_length });
    }

    let capacity = window_count(sequence.len(), sentence_length, step);
    let mut sentences = Vec::with_capacity(capacity);
    let mut next_ids = Vec::with_capacity(capacity);

    for i in (0..sentence_length).step_by(step) {
        let mut window = vec![PAD_ID; sentence_length - i];
        window.extend_from_slice(&sequence[..i]);
        sentences.push(window);
        next_ids.push(sequence[i]);
    }

    for i in (0..sequence.len() - sentence_length).step_by(step) {
        sentences.push(sequence[i..i + sentence_length].to_vec());
        next_ids.push(sequence[i + sentence_length]);
    }

    info!("total # of sentences: {}", sentences.len());

    Ok(Windows { sentence_length, sentences, next_ids })
}

impl Windows {
    pub fn len(&self) -> usize {
        self.sentences.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sentences.is_empty()
    }

    /// One-hot encodes every window and target.
    pub fn encode(&self, vocab_size: usize) -> Result<EncodedDataset, DataError> {
        let mut inputs = Array3::from_elem((self.len(), self.sentence_length, vocab_size), false);
        let mut targets = Array2::from_elem((self.len(), vocab_size), false);

        for (i, (sentence, &next_id)) in self.sentences.iter().zip(&self.next_ids).enumerate() {
            inputs.index_axis_mut(Axis(0), i).assign(&encode_window(sentence, vocab_size)?);
            targets[[i, check_id(next_id, vocab_size)?]] = true;
        }

        Ok(EncodedDataset { inputs, targets })
    }
}

fn check_id(id: usize, vocab_size: usize) -> Result<usize, DataError> {
    if id < vocab_size {
        Ok(id)
    } else {
        Err(DataError::IdOutOfRange { id, vocab_size })
    }
}

/// `(window.len(), vocab_size)` boolean matrix with one set bit per row.
pub fn encode_window(window: &[usize], vocab_size: usize) -> Result<Array2<bool>, DataError> {
    let mut encoded = Array2::from_elem((window.len(), vocab_size), false);
    for (t, &id) in window.iter().enumerate() {
        encoded[[t, check_id(id, vocab_size)?]] = true;
    }
    Ok(encoded)
}

/// One-hot training tensors: `inputs` is (samples, sentence_length, vocab_size),
/// `targets` is (samples, vocab_size).
#[derive(Clone, Debug)]
pub struct EncodedDataset {
    pub inputs: Array3<bool>,
    pub targets: Array2<bool>,
}

impl EncodedDataset {
    pub fn len(&self) -> usize {
        self.inputs.len_of(Axis(0))
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn sentence_length(&self) -> usize {
        self.inputs.len_of(Axis(1))
    }

    pub fn vocab_size(&self) -> usize {
        self.inputs.len_of(Axis(2))
    }

    /// Gathers samples into per-timestep `(vocab_size, batch)` float matrices
    /// plus a `(vocab_size, batch)` target matrix.
    pub fn batch(&self, indices: &[usize]) -> (Vec<Array2<f64>>, Array2<f64>) {
        let vocab = self.vocab_size();
        let mut steps = vec![Array2::zeros((vocab, indices.len())); self.sentence_length()];
        let mut targets = Array2::zeros((vocab, indices.len()));

        for (col, &sample) in indices.iter().enumerate() {
            for (t, step) in steps.iter_mut().enumerate() {
                let row = self.inputs.slice(s![sample, t, ..]);
                step.column_mut(col).assign(&row.mapv(|b| if b { 1.0 } else { 0.0 }));
            }
            let target = self.targets.row(sample);
            targets.column_mut(col).assign(&target.mapv(|b| if b { 1.0 } else { 0.0 }));
        }

        (steps, targets)
    }
}

/// Converts a boolean `(sentence_length, vocab_size)` window into the
/// per-timestep `(vocab_size, 1)` columns the encoder consumes.
pub fn window_to_steps(window: &Array2<bool>) -> Vec<Array2<f64>> {
    window.axis_iter(Axis(0))
        .map(|row| row.mapv(|b| if b { 1.0 } else { 0.0 }).insert_axis(Axis(1)))
        .collect()
}
