// Minibatch stochastic gradient descent.
//
// Each epoch draws a fresh permutation of the whole training set, cuts it
// into contiguous batches of `batch_size` and runs reset -> forward ->
// backward -> update on each. A trailing batch smaller than `batch_size` is
// dropped rather than run short, so every recorded training loss is an
// average over the same number of examples. With `N` examples, an epoch is
// `N / batch_size` iterations and up to `batch_size - 1` examples sit out.
//
// Loss bookkeeping:
// - training loss per iteration, on the batch just used, when
//   `config.track_loss` is set (the value comes from the forward pass that
//   produced the gradients, i.e. before the step),
// - validation loss once per epoch over the whole validation set, recorded
//   with the iteration count reached so far.
//
// Non-finite losses are recorded as-is and logged once; the trainer does not
// stop or clip. Whether a diverged run is worth continuing is the caller's
// call. Shuffling draws from the caller's `NotePrng`, so a seeded generator
// plus a seeded `Mlp` make a run reproducible.

use crate::config::TrainConfig;
use crate::encoding::{Dataset, Note, one_hot_notes};
use crate::error::{NoteNetError, Result};
use crate::model::{Model, cross_entropy};
use ndarray::Axis;
use notenet_prng::NotePrng;
use serde::{Deserialize, Serialize};

/// Loss curves recorded during `train`, ready to be plotted elsewhere.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct LossHistory {
    /// One entry per iteration (when loss tracking is on).
    pub train: Vec<f64>,
    /// `(iterations so far, loss)` once per epoch (when a validation set is given).
    pub valid: Vec<(usize, f64)>,
    /// Total gradient steps taken.
    pub iterations: usize,
}

impl LossHistory {
    pub fn final_train(&self) -> Option<f64> {
        self.train.last().copied()
    }

    pub fn final_valid(&self) -> Option<f64> {
        self.valid.last().map(|&(_, loss)| loss)
    }
}

fn check_width(model: &Model, data: &Dataset, what: &'static str) -> Result<()> {
    let expected = model.network().num_features();
    if !data.is_empty() && data.num_features() != expected {
        return Err(NoteNetError::ShapeMismatch {
            what,
            expected: vec![data.len(), expected],
            actual: vec![data.len(), data.num_features()],
        });
    }
    Ok(())
}

/// Train `model` in place and return the recorded loss curves.
pub fn train(
    model: &mut Model,
    train_set: &Dataset,
    valid_set: Option<&Dataset>,
    config: &TrainConfig,
    rng: &mut NotePrng,
) -> Result<LossHistory> {
    config.validate()?;
    check_width(model, train_set, "training set")?;
    let valid_set = valid_set.filter(|v| !v.is_empty());
    if let Some(valid) = valid_set {
        check_width(model, valid, "validation set")?;
    }

    let n = train_set.len();
    let batches_per_epoch = n / config.batch_size;
    if batches_per_epoch == 0 {
        tracing::warn!(
            examples = n,
            batch_size = config.batch_size,
            "training set smaller than one batch; no updates will run"
        );
    } else if n % config.batch_size != 0 {
        tracing::debug!(
            dropped = n % config.batch_size,
            "trailing partial batch is skipped every epoch"
        );
    }

    let valid_targets = valid_set.map(|v| one_hot_notes(&v.t)).transpose()?;
    let mut indices: Vec<usize> = (0..n).collect();
    let mut history = LossHistory::default();
    let mut reported_non_finite = false;

    for epoch in 1..=config.epochs {
        rng.shuffle(&mut indices);

        for batch in indices.chunks_exact(config.batch_size) {
            let x = train_set.x.select(Axis(0), batch);
            let targets: Vec<Note> = batch.iter().map(|&i| train_set.t[i]).collect();
            let t = one_hot_notes(&targets)?;

            model.reset();
            model.forward(x)?;
            model.backward(&t)?;
            model.update(config.learning_rate)?;

            if config.track_loss {
                let loss = model.loss(&t)?;
                if !loss.is_finite() && !reported_non_finite {
                    tracing::warn!(
                        epoch,
                        iteration = history.iterations,
                        loss,
                        "training loss became non-finite; check the learning rate"
                    );
                    reported_non_finite = true;
                }
                history.train.push(loss);
            }
            history.iterations += 1;
        }

        if let (Some(valid), Some(t_valid)) = (valid_set, valid_targets.as_ref()) {
            model.reset();
            let probabilities = model.network().predict(valid.x.view())?;
            let loss = cross_entropy(&probabilities, t_valid)?;
            history.valid.push((history.iterations, loss));
        }

        tracing::info!(
            epoch,
            epochs = config.epochs,
            iterations = history.iterations,
            train_loss = ?history.final_train(),
            valid_loss = ?history.final_valid(),
            "epoch complete"
        );
    }

    model.reset();
    Ok(history)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::decode::argmax;
    use crate::encoding::{encode_context, encode_examples};
    use crate::windowing::make_windows;

    fn dataset_from(notes: &[Note], context_length: usize) -> Dataset {
        encode_examples(&make_windows(notes, context_length).unwrap()).unwrap()
    }

    fn small_config() -> TrainConfig {
        TrainConfig {
            context_length: 3,
            hidden_size: 16,
            learning_rate: 0.2,
            batch_size: 10,
            epochs: 3,
            track_loss: true,
        }
    }

    fn scale_piece(len: usize) -> Vec<Note> {
        (0..len).map(|i| 60 + (i % 8) as Note).collect()
    }

    #[test]
    fn partial_batches_are_dropped() {
        let config = small_config();
        // 27 notes, context 3 -> 25 examples -> 2 full batches of 10.
        let data = dataset_from(&scale_piece(27), 3);
        assert_eq!(data.len(), 25);

        let mut rng = NotePrng::new(1);
        let mut model = Model::for_config(&config, &mut rng).unwrap();
        let history = train(&mut model, &data, None, &config, &mut rng).unwrap();

        assert_eq!(history.iterations, 6);
        assert_eq!(history.train.len(), 6);
        assert!(history.valid.is_empty());
        // The model comes back with empty caches.
        assert!(model.probabilities().is_none());
    }

    #[test]
    fn validation_recorded_once_per_epoch() {
        let config = small_config();
        let data = dataset_from(&scale_piece(27), 3);
        let valid = dataset_from(&scale_piece(12), 3);

        let mut rng = NotePrng::new(2);
        let mut model = Model::for_config(&config, &mut rng).unwrap();
        let history = train(&mut model, &data, Some(&valid), &config, &mut rng).unwrap();

        let checkpoints: Vec<usize> = history.valid.iter().map(|&(it, _)| it).collect();
        assert_eq!(checkpoints, vec![2, 4, 6]);
        assert!(history.valid.iter().all(|&(_, loss)| loss.is_finite()));
    }

    #[test]
    fn loss_tracking_can_be_disabled() {
        let config = TrainConfig {
            track_loss: false,
            ..small_config()
        };
        let data = dataset_from(&scale_piece(27), 3);
        let valid = dataset_from(&scale_piece(12), 3);

        let mut rng = NotePrng::new(3);
        let mut model = Model::for_config(&config, &mut rng).unwrap();
        let history = train(&mut model, &data, Some(&valid), &config, &mut rng).unwrap();
        assert!(history.train.is_empty());
        assert_eq!(history.iterations, 6);
        assert_eq!(history.valid.len(), 3);
    }

    #[test]
    fn tiny_dataset_runs_no_iterations() {
        let config = small_config();
        let data = dataset_from(&scale_piece(5), 3);
        let mut rng = NotePrng::new(4);
        let mut model = Model::for_config(&config, &mut rng).unwrap();
        let before = model.network().w1().clone();
        let history = train(&mut model, &data, None, &config, &mut rng).unwrap();
        assert_eq!(history.iterations, 0);
        assert_eq!(model.network().w1(), &before);
    }

    #[test]
    fn same_seeds_same_run() {
        let config = small_config();
        let data = dataset_from(&scale_piece(40), 3);
        let run = |seed| {
            let mut rng = NotePrng::new(seed);
            let mut model = Model::for_config(&config, &mut rng).unwrap();
            train(&mut model, &data, None, &config, &mut rng).unwrap()
        };
        assert_eq!(run(7), run(7));
        assert_ne!(run(7).train, run(8).train);
    }

    #[test]
    fn rejects_mismatched_feature_width() {
        let config = small_config();
        let data = dataset_from(&scale_piece(30), 4);
        let mut rng = NotePrng::new(5);
        let mut model = Model::for_config(&config, &mut rng).unwrap();
        let err = train(&mut model, &data, None, &config, &mut rng).unwrap_err();
        assert!(matches!(err, NoteNetError::ShapeMismatch { .. }));
        assert!(err.to_string().contains("training set"));
    }

    #[test]
    fn training_lowers_loss_on_a_repeating_scale() {
        let config = TrainConfig {
            epochs: 60,
            ..small_config()
        };
        let data = dataset_from(&scale_piece(83), 3);
        let mut rng = NotePrng::new(6);
        let mut model = Model::for_config(&config, &mut rng).unwrap();
        let history = train(&mut model, &data, None, &config, &mut rng).unwrap();
        let first = history.train[0];
        let last = history.final_train().unwrap();
        assert!(last < first, "loss did not drop: {first} -> {last}");
    }

    #[test]
    fn memorises_a_constant_piece() {
        // 40 repeats of note 5: 20 sliding windows predict 5 and the terminal
        // example predicts the end marker, so 5 should win.
        let config = TrainConfig {
            context_length: 20,
            hidden_size: 32,
            learning_rate: 0.2,
            batch_size: 7,
            epochs: 150,
            track_loss: true,
        };
        let data = dataset_from(&[5; 40], 20);
        assert_eq!(data.len(), 21);

        let mut rng = NotePrng::new(10);
        let mut model = Model::for_config(&config, &mut rng).unwrap();
        let history = train(&mut model, &data, None, &config, &mut rng).unwrap();
        assert_eq!(history.iterations, 3 * config.epochs);

        let features = encode_context(&[5; 20]).unwrap().insert_axis(Axis(0));
        let probabilities = model.network().predict(features.view()).unwrap();
        assert_eq!(argmax(probabilities.row(0)), 5);
    }

    #[test]
    fn shortest_constant_piece_splits_between_note_and_end() {
        // 21 notes with context 20: one window predicts 5, the terminal
        // example has the same context and predicts the end marker. Full-batch
        // training drives both classes toward one half each.
        let config = TrainConfig {
            context_length: 20,
            hidden_size: 32,
            learning_rate: 0.2,
            batch_size: 2,
            epochs: 600,
            track_loss: true,
        };
        let data = dataset_from(&[5; 21], 20);
        assert_eq!(data.len(), 2);
        assert_eq!(data.x.row(0), data.x.row(1));

        let mut rng = NotePrng::new(10);
        let mut model = Model::for_config(&config, &mut rng).unwrap();
        train(&mut model, &data, None, &config, &mut rng).unwrap();

        let features = encode_context(&[5; 20]).unwrap().insert_axis(Axis(0));
        let probabilities = model.network().predict(features.view()).unwrap();
        let (p_note, p_end) = (probabilities[[0, 5]], probabilities[[0, 0]]);
        assert!(p_note + p_end > 0.9, "other notes kept mass");
        assert!(p_note > 0.35, "note 5 at {p_note}, end at {p_end}");
        assert!(p_end > 0.35, "end at {p_end}, note 5 at {p_note}");
        let winner = argmax(probabilities.row(0));
        assert!(winner == 5 || winner == 0);
    }
}
