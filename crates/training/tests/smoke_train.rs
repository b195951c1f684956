use image::{GrayImage, Luma};
use std::fs;
use std::path::Path;
use training::config::RunConfig;
use training::util::{evaluate_with_config, train_with_config};
use training::CheckpointPaths;

fn write_split(dir: &Path, names: &[&str]) {
    fs::create_dir_all(dir).unwrap();
    for (i, name) in names.iter().enumerate() {
        let (w, h) = (30 + 5 * i as u32, 12 + 2 * i as u32);
        let mut img = GrayImage::from_pixel(w, h, Luma([235]));
        for x in 1..w - 1 {
            img.put_pixel(x, (x + i as u32) % h, Luma([20]));
        }
        img.save(dir.join(name)).unwrap();
    }
}

fn tiny_config(root: &Path) -> RunConfig {
    let data_root = root.join("data");
    write_split(
        &data_root.join("T/train"),
        &["a-1.png", "a-2.png", "b-1.png", "b-2.png", "c-1.png", "c-2.png"],
    );
    write_split(&data_root.join("T/test"), &["a-3.png", "b-3.png", "c-3.png"]);
    RunConfig {
        dataset: "T".into(),
        data_root,
        output_dir: root.join("out"),
        epochs: 2,
        batch_size: 2,
        seed: Some(5),
        scale_size: (16, 32),
        base_channels: 2,
        hidden: 4,
        ..RunConfig::default()
    }
}

#[test]
fn train_evaluate_and_resume_on_synthetic_split() {
    let tmp = tempfile::tempdir().unwrap();
    let cfg = tiny_config(tmp.path());
    let paths = CheckpointPaths::new(&cfg.output_dir, &cfg.dataset);

    let last = train_with_config(&cfg).unwrap().expect("two epochs ran");
    assert_eq!(last.samples, 3);
    assert!((0.0..=100.0).contains(&last.top1));
    assert!(last.top5 >= last.top1);
    assert_eq!(paths.saved_epochs(), vec![0, 1]);
    assert!(paths.loss_plot().exists());
    assert!(tmp.path().join("data/T/Twriter_index_table.json").exists());

    let eval = evaluate_with_config(&cfg, 1).unwrap();
    assert_eq!(eval.samples, 3);
    assert!(evaluate_with_config(&cfg, 9).is_err());

    let resumed = RunConfig {
        start_epoch: 2,
        epochs: 3,
        ..cfg.clone()
    };
    train_with_config(&resumed).unwrap();
    assert_eq!(paths.saved_epochs(), vec![0, 1, 2]);

    let log = fs::read_to_string(paths.log_file()).unwrap();
    let lines: Vec<&str> = log.lines().collect();
    // Two epochs, one standalone evaluation, one resumed epoch.
    assert_eq!(lines.len(), 7);
    assert!(lines[0].starts_with("Training epoch 0 avg loss is: "));
    assert!(lines[1].starts_with("Testing epoch 0 accuracy is: top1: "));
    assert!(lines[6].starts_with("Testing epoch 2 accuracy is: "));
}

#[test]
fn missing_dataset_points_to_download_page() {
    let tmp = tempfile::tempdir().unwrap();
    let cfg = RunConfig {
        dataset: "CVL".into(),
        data_root: tmp.path().to_path_buf(),
        output_dir: tmp.path().join("out"),
        ..RunConfig::default()
    };
    let err = train_with_config(&cfg).unwrap_err();
    assert!(format!("{err:#}").contains(writer_dataset::DATASET_SOURCE_URL));
}
