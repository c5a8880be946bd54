//! Integration tests for the slot store and the stores built on it
//!
//! These tests verify that slot addressing, id allocation and the metadata,
//! versioning and file stores agree on the on-disk layout.

#[cfg(test)]
mod tests {
    use crate::storage::{
        FileStore, LocalHistoryRepository, MetadataOptions, MetadataStore, Store,
        VersioningMetadataStore,
    };
    use std::sync::Arc;
    use tempfile::TempDir;

    fn create_test_store(temp_dir: &TempDir, id: &str, prefix: &str, suffix: &str) -> Store {
        Store::new(
            id,
            temp_dir.path().join(id),
            "4-2-2".parse().unwrap(),
            prefix,
            suffix,
        )
        .unwrap()
    }

    #[test]
    fn test_metadata_and_file_slots_share_layout() {
        let temp_dir = TempDir::new().unwrap();
        let metadata = MetadataStore::new(
            create_test_store(&temp_dir, "mods", "mods_", ".xml"),
            MetadataOptions::default(),
        );
        let files = FileStore::new(create_test_store(&temp_dir, "derivate", "", ""));

        let record = metadata.create(b"<mods/>", Some(10485)).unwrap();
        let collection = files.create(Some(10485)).unwrap();

        let record_path = record.path().unwrap();
        let relative = record_path.strip_prefix(temp_dir.path().join("mods")).unwrap();
        assert_eq!(relative, std::path::Path::new("0001/04/mods_00010485.xml"));

        let relative = collection
            .path()
            .strip_prefix(temp_dir.path().join("derivate"))
            .unwrap();
        assert_eq!(relative, std::path::Path::new("0001/04/00010485"));
    }

    #[test]
    fn test_sequential_creates_are_strictly_increasing() {
        let temp_dir = TempDir::new().unwrap();
        let metadata = MetadataStore::new(
            create_test_store(&temp_dir, "mods", "mods_", ".xml"),
            MetadataOptions::default(),
        );

        let mut ids = Vec::new();
        for n in 0..6 {
            let id = metadata.create(b"<a/>", None).unwrap().id();
            ids.push(id);
            if n % 3 == 2 {
                metadata.delete(id).unwrap();
            }
        }

        assert!(ids.windows(2).all(|pair| pair[0] < pair[1]));
        assert_eq!(
            metadata.store().highest_stored_id().unwrap(),
            ids[4],
            "the last create was deleted, the one before it is the highest"
        );
        assert_eq!(metadata.store().count().unwrap(), 4);
    }

    #[test]
    fn test_versioning_store_reads_plain_mirror() {
        let temp_dir = TempDir::new().unwrap();
        let repository =
            LocalHistoryRepository::open(temp_dir.path().join("history"), "tester").unwrap();
        let versioning = VersioningMetadataStore::new(
            MetadataStore::new(
                create_test_store(&temp_dir, "mods", "mods_", ".xml"),
                MetadataOptions::default(),
            ),
            Arc::new(repository),
        );
        versioning.create(b"<doc>v1</doc>", Some(42)).unwrap();

        // A plain metadata store on the same directory sees the mirror
        let plain = MetadataStore::new(
            Store::new(
                "mods",
                temp_dir.path().join("mods"),
                "4-2-2".parse().unwrap(),
                "mods_",
                ".xml",
            )
            .unwrap(),
            MetadataOptions::default(),
        );
        let mut record = plain.retrieve(42).unwrap().unwrap();
        let content = String::from_utf8(record.read().unwrap()).unwrap();
        assert!(content.contains("<doc>v1</doc>"));
    }
}
