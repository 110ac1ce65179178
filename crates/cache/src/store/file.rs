use std::fs::{self, File};
use std::io::{self, BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};

use ropey::Rope;
use weft_primitives::{Error, Result, StoreKey};

use super::DurableStore;

/// Directory-backed text store, one UTF-8 file per key.
#[derive(Debug, Clone)]
pub struct FileStore {
	dir: PathBuf,
}

impl FileStore {
	/// Opens (creating if needed) a store rooted at `dir`.
	pub fn new(dir: impl Into<PathBuf>) -> io::Result<Self> {
		let dir = dir.into();
		fs::create_dir_all(&dir)?;
		Ok(Self { dir })
	}

	/// Root directory of this store.
	pub fn dir(&self) -> &Path {
		&self.dir
	}

	fn path_for(&self, key: StoreKey) -> PathBuf {
		self.dir.join(format!("{}.txt", key.0))
	}
}

impl DurableStore<Rope> for FileStore {
	fn write(&self, key: StoreKey, value: &Rope) -> Result<()> {
		let path = self.path_for(key);
		let write = || -> io::Result<()> {
			let mut writer = BufWriter::new(File::create(&path)?);
			value.write_to(&mut writer)?;
			writer.flush()
		};
		write().map_err(|error| Error::Io { key, error })?;
		tracing::trace!(%key, path = %path.display(), "store.file.write");
		Ok(())
	}

	fn read(&self, key: StoreKey) -> Result<Rope> {
		let file = match File::open(self.path_for(key)) {
			Ok(file) => file,
			Err(error) if error.kind() == io::ErrorKind::NotFound => return Err(Error::SourceUnavailable { key }),
			Err(error) => return Err(Error::Io { key, error }),
		};
		Rope::from_reader(BufReader::new(file)).map_err(|error| Error::Io { key, error })
	}

	fn purge(&self, key: StoreKey) -> bool {
		fs::remove_file(self.path_for(key)).is_ok()
	}
}
