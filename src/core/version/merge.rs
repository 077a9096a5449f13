// ─── Descriptor Inheritance ───
// Combines a parent descriptor with a child that declares `inheritsFrom`.
//
// Per field:
//   id                         child, `inheritsFrom` cleared
//   scalars / download blocks  child overrides when present
//   libraries                  parent order; same group:artifact[:classifier]
//                              replaced at its first position (other parent
//                              entries with that key dropped), new child
//                              entries appended
//   arguments.game / .jvm      parent then child

use std::collections::HashSet;

use super::version_file::{Arguments, Library, VersionDescriptor};

/// Merge `child` on top of `parent`. Both inputs are left untouched.
pub fn merge(parent: &VersionDescriptor, child: &VersionDescriptor) -> VersionDescriptor {
    VersionDescriptor {
        id: child.id.clone(),
        inherits_from: None,
        version_type: child.version_type.clone().or_else(|| parent.version_type.clone()),
        main_class: child.main_class.clone().or_else(|| parent.main_class.clone()),
        minimum_launcher_version: child
            .minimum_launcher_version
            .or(parent.minimum_launcher_version),
        libraries: merge_libraries(&parent.libraries, &child.libraries),
        downloads: child.downloads.clone().or_else(|| parent.downloads.clone()),
        asset_index: child.asset_index.clone().or_else(|| parent.asset_index.clone()),
        assets: child.assets.clone().or_else(|| parent.assets.clone()),
        arguments: merge_arguments(parent.arguments.as_ref(), child.arguments.as_ref()),
        minecraft_arguments: child
            .minecraft_arguments
            .clone()
            .or_else(|| parent.minecraft_arguments.clone()),
        java_version: child.java_version.or(parent.java_version),
    }
}

fn library_key(lib: &Library) -> String {
    match lib.coordinate() {
        Ok(coord) => coord.key(),
        // Unparseable names only ever match themselves.
        Err(_) => lib.name.clone(),
    }
}

fn merge_libraries(parent: &[Library], child: &[Library]) -> Vec<Library> {
    let parent_keys: Vec<String> = parent.iter().map(library_key).collect();
    let mut slots: Vec<Option<Library>> = parent.iter().cloned().map(Some).collect();
    let mut overridden = HashSet::new();
    let mut appended = Vec::new();

    for lib in child {
        let key = library_key(lib);
        let first = parent_keys.iter().position(|k| *k == key);
        match first {
            Some(pos) if overridden.insert(key.clone()) => {
                // Every parent entry sharing the key goes; the child takes
                // the first one's place.
                for (i, parent_key) in parent_keys.iter().enumerate() {
                    if *parent_key == key {
                        slots[i] = None;
                    }
                }
                slots[pos] = Some(lib.clone());
            }
            _ => appended.push(lib.clone()),
        }
    }

    slots.into_iter().flatten().chain(appended).collect()
}

fn merge_arguments(parent: Option<&Arguments>, child: Option<&Arguments>) -> Option<Arguments> {
    match (parent, child) {
        (None, None) => None,
        (Some(p), None) => Some(p.clone()),
        (None, Some(c)) => Some(c.clone()),
        (Some(p), Some(c)) => {
            let mut merged = p.clone();
            merged.game.extend(c.game.iter().cloned());
            merged.jvm.extend(c.jvm.iter().cloned());
            Some(merged)
        }
    }
}
