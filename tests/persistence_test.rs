use brnn_sequence::persistence::{ModelPersistence, SavedModel};
use brnn_sequence::{
    build_windows, encode_window, CellKind, GRUCell, LSTMCell, ModelMetadata, ModelShape, PersistenceError,
    PersistentModel, SequenceModel, Trainer, TrainingConfig,
};
use rand::rngs::StdRng;
use rand::SeedableRng;
use tempfile::tempdir;

fn shape() -> ModelShape {
    ModelShape { sentence_length: 3, vocab_size: 6, hidden_size: 5 }
}

fn trained_lstm() -> SequenceModel<LSTMCell> {
    let mut rng = StdRng::seed_from_u64(1337);
    let sequence: Vec<usize> = [1, 4, 2, 3].iter().cycle().take(30).cloned().collect();
    let dataset = build_windows(&sequence, 3, 1).unwrap().encode(6).unwrap();

    let model = SequenceModel::new(shape(), 0.2, &mut rng);
    let mut trainer = Trainer::new(model, TrainingConfig { batch_size: 8, epochs: 2, ..TrainingConfig::default() });
    trainer.fit(&dataset, &mut rng, None).unwrap();
    trainer.into_model()
}

fn windows() -> Vec<Vec<usize>> {
    vec![vec![0, 0, 1], vec![1, 4, 2], vec![3, 1, 4], vec![5, 5, 5]]
}

#[test]
fn test_save_load_json_gives_identical_predictions() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("model.json");
    let model = trained_lstm();

    let metadata = ModelMetadata::new(&model, "json_model", 2, Some(1.0)).with_description("round trip");
    model.save(&path, metadata.clone()).unwrap();
    assert!(path.exists());

    let (loaded, loaded_metadata) = SequenceModel::<LSTMCell>::load(&path).unwrap();
    assert_eq!(loaded_metadata, metadata);
    assert_eq!(loaded.shape(), model.shape());

    for window in windows() {
        let encoded = encode_window(&window, 6).unwrap();
        assert_eq!(model.predict(&encoded), loaded.predict(&encoded));
    }
}

#[test]
fn test_save_load_binary_gives_identical_predictions() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("weights.bin");
    let mut rng = StdRng::seed_from_u64(4);
    let model = SequenceModel::<GRUCell>::new(shape(), 0.0, &mut rng);

    model.save(&path, ModelMetadata::new(&model, "gru", 0, None)).unwrap();
    let (loaded, metadata) = SequenceModel::<GRUCell>::load(&path).unwrap();

    assert_eq!(metadata.cell, CellKind::Gru);
    assert_eq!(loaded.dropout.dropout_rate, 0.0);
    for window in windows() {
        let encoded = encode_window(&window, 6).unwrap();
        assert_eq!(model.predict(&encoded), loaded.predict(&encoded));
    }
}

#[test]
fn test_loading_with_the_wrong_cell_fails() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("lstm.bin");
    let model = trained_lstm();
    model.save(&path, ModelMetadata::new(&model, "lstm", 2, None)).unwrap();

    let result = SequenceModel::<GRUCell>::load(&path);
    assert!(matches!(result, Err(PersistenceError::CellMismatch { .. })));
}

#[test]
fn test_json_file_is_readable_without_the_model_type() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("inspect.json");
    let model = trained_lstm();
    model.save(&path, ModelMetadata::new(&model, "inspect", 2, Some(0.25))).unwrap();

    let saved: SavedModel = ModelPersistence::load_from_json(&path).unwrap();
    assert_eq!(saved.metadata.model_name, "inspect");
    assert_eq!(saved.metadata.best_loss, Some(0.25));
    assert_eq!(saved.model.cell, CellKind::Lstm);
    assert_eq!(saved.model.parameters.len(), 10);

    let text = std::fs::read_to_string(&path).unwrap();
    assert!(text.contains("\"forward.w_ih\""));
    assert!(text.contains("\"created_at\""));
}

#[test]
fn test_corrupt_files_are_errors() {
    let dir = tempdir().unwrap();
    let json = dir.path().join("broken.json");
    std::fs::write(&json, "{\"metadata\": 1}").unwrap();
    assert!(matches!(SequenceModel::<LSTMCell>::load(&json), Err(PersistenceError::Json(_))));

    let bin = dir.path().join("broken.bin");
    std::fs::write(&bin, [1u8, 2, 3]).unwrap();
    assert!(matches!(SequenceModel::<LSTMCell>::load(&bin), Err(PersistenceError::Binary(_))));

    let missing = dir.path().join("missing.bin");
    assert!(matches!(SequenceModel::<LSTMCell>::load(&missing), Err(PersistenceError::Io(_))));
}
