mod common;

use fluxtower_core::checkpoint::{CheckpointStore, Manifest, LAST_CONTACT_FILE};
use fluxtower_core::PipelineError;

use common::{temp_dir, ts};

#[test]
fn absent_checkpoints_load_as_none() -> anyhow::Result<()> {
    let store = CheckpointStore::new(temp_dir("checkpoint-empty"));
    assert!(store.load_last_contact()?.is_none());
    assert!(store.load_manifest()?.is_none());
    std::fs::remove_dir_all(store.dir())?;
    Ok(())
}

#[test]
fn checkpoints_round_trip() -> anyhow::Result<()> {
    let store = CheckpointStore::new(temp_dir("checkpoint"));
    let contact = ts("2023-06-02 10:17:33");
    let mut manifest = Manifest::new();
    manifest.insert(
        "summaries".into(),
        vec!["2023-06-01_AIU-1309_EP-Summary.txt".into()],
    );

    store.save_last_contact(contact)?;
    store.save_manifest(&manifest)?;

    assert_eq!(store.load_last_contact()?, Some(contact));
    assert_eq!(store.load_manifest()?, Some(manifest));
    std::fs::remove_dir_all(store.dir())?;
    Ok(())
}

#[test]
fn corrupt_checkpoint_is_an_error() -> anyhow::Result<()> {
    let store = CheckpointStore::new(temp_dir("checkpoint-corrupt"));
    std::fs::write(store.dir().join(LAST_CONTACT_FILE), "{not json")?;

    let err = store.load_last_contact().unwrap_err();
    assert!(matches!(err, PipelineError::Checkpoint { .. }));
    std::fs::remove_dir_all(store.dir())?;
    Ok(())
}
