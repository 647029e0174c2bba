use cliplane_core::{
    CliplaneConfig, Engine, SharedCaches,
    fixtures::demo_project,
    persistence::{load_project, save_project},
};
use proptest::prelude::*;

fn no_panic_load(path: &std::path::Path) -> bool {
    std::panic::catch_unwind(|| {
        let _ = load_project(path);
    })
    .is_ok()
}

proptest! {
    #![proptest_config(ProptestConfig {
        cases: 64,
        .. ProptestConfig::default()
    })]

    #[test]
    fn random_project_bytes_do_not_panic(raw in prop::collection::vec(any::<u8>(), 0..4096)) {
        let temp = tempfile::tempdir().expect("tempdir should be creatable");
        let path = temp.path().join("corrupt_random.cliplane.json");
        std::fs::write(&path, raw).expect("writing random payload should work");
        prop_assert!(no_panic_load(&path));
    }
}

proptest! {
    #![proptest_config(ProptestConfig {
        cases: 64,
        .. ProptestConfig::default()
    })]

    #[test]
    fn truncated_project_payloads_do_not_panic(prefix_len in 0usize..8192usize) {
        let temp = tempfile::tempdir().expect("tempdir should be creatable");
        let path = temp.path().join("corrupt_truncated.cliplane.json");
        save_project(&path, &demo_project()).expect("saving fixture project should work");

        let mut payload = std::fs::read(&path).expect("reading saved project should work");
        let truncated_len = prefix_len.min(payload.len());
        payload.truncate(truncated_len);
        std::fs::write(&path, payload).expect("writing truncated payload should work");

        prop_assert!(no_panic_load(&path));
    }
}

proptest! {
    #![proptest_config(ProptestConfig {
        cases: 64,
        .. ProptestConfig::default()
    })]

    #[test]
    fn mutated_project_payloads_do_not_panic(index in 0usize..8192usize, delta in any::<u8>()) {
        let temp = tempfile::tempdir().expect("tempdir should be creatable");
        let path = temp.path().join("corrupt_mutated.cliplane.json");
        save_project(&path, &demo_project()).expect("saving fixture project should work");

        let mut payload = std::fs::read(&path).expect("reading saved project should work");
        if !payload.is_empty() {
            let target = index % payload.len();
            payload[target] ^= delta.max(1);
        }
        std::fs::write(&path, payload).expect("writing mutated payload should work");

        prop_assert!(no_panic_load(&path));
    }
}

#[test]
fn saved_demo_project_loads_back_with_healed_references() {
    let temp = tempfile::tempdir().expect("tempdir should be creatable");
    let path = temp.path().join("demo.cliplane.json");
    let project = demo_project();
    save_project(&path, &project).expect("saving fixture project should work");

    let mut engine = cliplane_core::Engine::with_caches(
        cliplane_core::Project::new("Scratch", 120, 48_000),
        cliplane_core::SharedCaches::new(None),
    );
    let loaded = engine.load_project(&path).expect("fixture project should load");
    assert_eq!(*loaded, project);
    assert!(
        loaded
            .mixer
            .clips()
            .all(|clip| clip.track.resolve(&loaded.mixer).is_live())
    );
    assert!(!engine.can_undo());
}

#[test]
fn clip_track_refs_are_rebound_on_load_even_if_the_file_lies() {
    let temp = tempfile::tempdir().expect("tempdir should be creatable");
    let path = temp.path().join("lying.cliplane.json");
    let project = demo_project();
    let mut json = serde_json::to_value(&project).expect("project serializes");
    json["mixer"]["tracks"][0]["clips"][0]["track"] = serde_json::Value::Null;
    std::fs::write(&path, serde_json::to_vec(&json).expect("json encodes"))
        .expect("writing payload should work");

    let loaded = load_project(&path).expect("project should load");
    let clip = &loaded.mixer.tracks[0].clips[0];
    assert!(clip.track.points_to(loaded.mixer.tracks[0].id));
}

#[test]
fn autosave_lands_in_the_configured_directory_and_loads_back() {
    let temp = tempfile::tempdir().expect("tempdir should be creatable");
    let mut config = CliplaneConfig::default();
    config.paths.autosave_dir = temp.path().join("autosave");

    let project = demo_project();
    let engine = Engine::with_caches(project.clone(), SharedCaches::new(None));
    let path = engine
        .autosave(&config.paths.autosave_dir)
        .expect("autosave should succeed");

    assert!(path.starts_with(&config.paths.autosave_dir));
    let loaded = load_project(&path).expect("autosave should load");
    assert_eq!(loaded.id, project.id);
    assert_eq!(loaded.clip_count(), project.clip_count());
}
