//! Graphviz description of the model layout.

use std::fs;
use std::io;
use std::path::Path;
use tracing::info;

use crate::layers::RecurrentCell;
use crate::models::sequence_model::SequenceModel;

/// Renders the layer graph as a DOT digraph, one node per layer with its output shape.
pub fn render_dot<C: RecurrentCell>(model: &SequenceModel<C>) -> String {
    let shape = model.shape();
    let cell = C::KIND.name();
    let hidden = shape.hidden_size;

    let nodes = [
        ("input", format!("input\\n(None, {}, {})", shape.sentence_length, shape.vocab_size)),
        ("forward", format!("forward {}\\n(None, {})", cell, hidden)),
        ("backward", format!("backward {} (go_backwards)\\n(None, {})", cell, hidden)),
        ("concat", format!("concat\\n(None, {})", 2 * hidden)),
        ("dropout", format!("dropout p={}\\n(None, {})", model.dropout.dropout_rate, 2 * hidden)),
        ("dense", format!("dense\\n(None, {})", shape.vocab_size)),
        ("softmax", format!("softmax\\n(None, {})", shape.vocab_size)),
    ];
    let edges = [
        ("input", "forward"),
        ("input", "backward"),
        ("forward", "concat"),
        ("backward", "concat"),
        ("concat", "dropout"),
        ("dropout", "dense"),
        ("dense", "softmax"),
    ];

    let mut dot = String::from("digraph brnn {\n    rankdir=TB;\n    node [shape=record];\n");
    for (id, label) in &nodes {
        dot.push_str(&format!("    {} [label=\"{}\"];\n", id, label));
    }
    for (from, to) in &edges {
        dot.push_str(&format!("    {} -> {};\n", from, to));
    }
    dot.push_str(&format!("    label=\"{} parameters\";\n", model.num_parameters()));
    dot.push_str("}\n");
    dot
}

pub fn write_dot<C: RecurrentCell, P: AsRef<Path>>(model: &SequenceModel<C>, path: P) -> io::Result<()> {
    let path = path.as_ref();
    fs::write(path, render_dot(model))?;
    info!("model graph written to {}", path.display());
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::layers::lstm_cell::LSTMCell;
    use crate::models::sequence_model::ModelShape;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    #[test]
    fn test_dot_lists_layers_and_shapes() {
        let shape = ModelShape { sentence_length: 40, vocab_size: 12, hidden_size: 8 };
        let model = SequenceModel::<LSTMCell>::new(shape, 0.2, &mut StdRng::seed_from_u64(0));
        let dot = render_dot(&model);

        assert!(dot.starts_with("digraph brnn {"));
        assert!(dot.trim_end().ends_with('}'));
        assert!(dot.contains("input\\n(None, 40, 12)"));
        assert!(dot.contains("backward LSTM (go_backwards)"));
        assert!(dot.contains("concat\\n(None, 16)"));
        assert!(dot.contains("dropout p=0.2"));
        assert!(dot.contains("input -> backward;"));
        assert!(dot.contains(&format!("{} parameters", model.num_parameters())));
    }

    #[test]
    fn test_dot_has_one_line_per_node_and_edge() {
        let shape = ModelShape { sentence_length: 5, vocab_size: 4, hidden_size: 3 };
        let model = SequenceModel::<LSTMCell>::new(shape, 0.0, &mut StdRng::seed_from_u64(0));
        let dot = render_dot(&model);
        let lines: Vec<&str> = dot.lines().collect();

        // header (3) + nodes (7) + edges (7) + label + closing brace
        assert_eq!(lines.len(), 19);
        assert_eq!(lines.iter().filter(|l| l.contains(" -> ")).count(), 7);
        assert_eq!(lines.iter().filter(|l| l.contains("[label=")).count(), 7);
        assert_eq!(lines[17], format!("    label=\"{} parameters\";", model.num_parameters()));
        assert_eq!(lines[18], "}");
    }
}
