use crate::store::operations::courses::Course;
use crate::store::{keys, Store, StoreError};

const VERSION_KEY: &str = "_meta:version";

type MigrationFn = fn(&Store) -> Result<(), StoreError>;

fn migrations() -> Vec<(&'static str, MigrationFn)> {
    vec![
        ("001_initial", m001_initial),
        ("002_courses_by_topic_index", m002_courses_by_topic_index),
    ]
}

/// Applies pending migrations in order.
///
/// Each migration must be idempotent: the process can stop after a migration
/// body ran but before its version was recorded, and it will run again on the
/// next start. Versions only move forward.
pub fn run(store: &Store) -> Result<(), StoreError> {
    let current = get_current_version(store)?;

    for (index, (name, func)) in migrations().iter().enumerate() {
        let version = (index + 1) as u32;
        if version > current {
            tracing::info!(version, name, "Running migration");
            func(store)?;
            set_version(store, version)?;
            tracing::info!(version, name, "Migration complete");
        } else {
            tracing::debug!(version, name, "Migration already applied, skipping");
        }
    }

    Ok(())
}

pub fn get_current_version(store: &Store) -> Result<u32, StoreError> {
    match store.config_versions.get(VERSION_KEY.as_bytes())? {
        Some(raw) => {
            let bytes: [u8; 4] = raw.as_ref().try_into().map_err(|_| StoreError::Migration {
                version: 0,
                message: format!("corrupt version marker ({} bytes)", raw.len()),
            })?;
            Ok(u32::from_be_bytes(bytes))
        }
        None => Ok(0),
    }
}

pub fn set_version(store: &Store, version: u32) -> Result<(), StoreError> {
    let current = get_current_version(store)?;
    if version < current {
        return Err(StoreError::Migration {
            version,
            message: format!("Refuse to downgrade from {} to {}", current, version),
        });
    }

    store
        .config_versions
        .insert(VERSION_KEY.as_bytes(), &version.to_be_bytes())?;
    Ok(())
}

fn m001_initial(_store: &Store) -> Result<(), StoreError> {
    Ok(())
}

/// Rebuilds the topic -> course index from the course rows.
fn m002_courses_by_topic_index(store: &Store) -> Result<(), StoreError> {
    for item in store.courses.iter() {
        let (_, value) = item?;
        let course: Course = Store::deserialize(&value)?;
        let index_key = keys::course_topic_index_key(&course.topic_id, &course.id);
        store.courses_by_topic.insert(index_key.as_bytes(), &[] as &[u8])?;
    }
    Ok(())
}
