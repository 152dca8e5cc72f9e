/// Bidirectional next-ID prediction model.
pub mod sequence_model;
