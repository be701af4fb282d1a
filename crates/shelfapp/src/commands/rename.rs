use crate::error::Result;
use crate::store::ShelfStore;

/// Changes the description. The directory name stays as it is.
pub fn run(store: &mut ShelfStore, name: &str, description: &str) -> Result<()> {
    let mut entry = store.get(name)?.clone();
    entry.description = description.to_string();
    store.update(entry)
}
