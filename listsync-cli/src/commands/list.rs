//! Offline list and folder editing.
//!
//! Indices are positions in the display sequence printed by `lists ls`,
//! counting members of collapsed folders even though they are hidden.

use clap::Subcommand;
use listsync_core::{
    insert_rank, live, reorder, sort_by_rank, Record, Store, StoreError,
};

#[derive(Debug, Subcommand)]
pub enum ListCommand {
    /// Show lists and folders in display order
    Ls {
        /// Also show members of collapsed folders
        #[arg(long, short)]
        all: bool,
    },
    /// Create a list at the end of the top level or of a folder
    New {
        /// Name of the list
        name: String,
        /// Index of the folder to create the list in
        #[arg(long = "in", value_name = "FOLDER")]
        folder: Option<usize>,
    },
    /// Create a folder
    Folder {
        /// Name of the folder
        name: String,
    },
    /// Rename a list or folder
    Rename { index: usize, name: String },
    /// Move a list or folder; lists dropped below a folder join it
    Mv { from: usize, to: usize },
    /// Collapse or expand a folder
    Toggle { index: usize },
    /// Delete a list or folder
    Rm { index: usize },
}

impl ListCommand {
    /// Returns true if the command changes the local collection.
    pub fn is_write(&self) -> bool {
        !matches!(self, ListCommand::Ls { .. })
    }

    pub fn run(&self, store: &dyn Store) -> Result<(), ListError> {
        let mut book = Book::open(store);

        match self {
            ListCommand::Ls { all } => {
                book.print(*all);
                Ok(())
            }
            ListCommand::New { name, folder } => {
                let group = match folder {
                    Some(index) => Some(book.folder_at(*index)?.id),
                    None => None,
                };
                let rank = insert_rank(&book.records, group.as_deref());
                let mut record = Record::list(name.clone()).with_rank(rank);
                record.group = group;
                println!("Created list '{}'", name);
                book.upsert(record);
                book.save()
            }
            ListCommand::Folder { name } => {
                let rank = insert_rank(&book.records, None);
                book.upsert(Record::folder(name.clone()).with_rank(rank));
                println!("Created folder '{}'", name);
                book.save()
            }
            ListCommand::Rename { index, name } => {
                let mut record = book.at(*index)?;
                record.rename(name.clone());
                book.upsert(record);
                println!("Renamed {} to '{}'", index, name);
                book.save()
            }
            ListCommand::Mv { from, to } => {
                let sequence = book.sequence();
                book.check(*from)?;
                book.check(*to)?;
                if from == to {
                    println!("Nothing to move");
                    return Ok(());
                }

                let moved_id = sequence[*from].id.clone();
                let reordered = reorder(&sequence, *from, *to);
                if let Some(moved) = reordered.into_iter().find(|r| r.id == moved_id) {
                    println!("Moved '{}'", display_name(&moved));
                    book.upsert(moved);
                }
                book.save()
            }
            ListCommand::Toggle { index } => {
                let mut folder = book.folder_at(*index)?;
                folder.toggle_open();
                println!(
                    "{} '{}'",
                    if folder.open { "Expanded" } else { "Collapsed" },
                    display_name(&folder)
                );
                book.upsert(folder);
                book.save()
            }
            ListCommand::Rm { index } => {
                let mut record = book.at(*index)?;
                record.mark_deleted();
                println!("Deleted '{}'", display_name(&record));
                if record.is_folder() {
                    println!("Its lists moved to the top level.");
                }
                book.upsert(record);
                book.save()
            }
        }
    }
}

/// The local collection, tombstones included.
struct Book<'a> {
    store: &'a dyn Store,
    records: Vec<Record>,
}

impl<'a> Book<'a> {
    fn open(store: &'a dyn Store) -> Self {
        Self {
            store,
            records: store.load_records(),
        }
    }

    fn sequence(&self) -> Vec<Record> {
        sort_by_rank(&live(&self.records))
    }

    fn check(&self, index: usize) -> Result<(), ListError> {
        let len = self.sequence().len();
        if index < len {
            Ok(())
        } else {
            Err(ListError::NoSuchIndex { index, len })
        }
    }

    fn at(&self, index: usize) -> Result<Record, ListError> {
        let sequence = self.sequence();
        let len = sequence.len();
        sequence
            .into_iter()
            .nth(index)
            .ok_or(ListError::NoSuchIndex { index, len })
    }

    fn folder_at(&self, index: usize) -> Result<Record, ListError> {
        let record = self.at(index)?;
        if record.is_folder() {
            Ok(record)
        } else {
            Err(ListError::NotAFolder(index))
        }
    }

    fn upsert(&mut self, record: Record) {
        match self.records.iter_mut().find(|r| r.id == record.id) {
            Some(slot) => *slot = record,
            None => self.records.push(record),
        }
    }

    fn save(&self) -> Result<(), ListError> {
        self.store.save_records(&sort_by_rank(&self.records))?;
        Ok(())
    }

    fn print(&self, all: bool) {
        let sequence = self.sequence();
        if sequence.is_empty() {
            println!("No lists yet. Create one with 'lists new <name>'.");
            return;
        }

        let mut collapsed: Option<&str> = None;
        for (index, record) in sequence.iter().enumerate() {
            if record.is_folder() {
                collapsed = (!record.open).then_some(record.id.as_str());
                let hidden = sequence
                    .iter()
                    .filter(|r| r.is_member_of(&record.id))
                    .count();
                let marker = if record.open { "▾" } else { "▸" };
                if record.open || hidden == 0 {
                    println!("{:>3}  {} {}", index, marker, display_name(record));
                } else {
                    println!(
                        "{:>3}  {} {} ({} hidden)",
                        index,
                        marker,
                        display_name(record),
                        hidden
                    );
                }
                continue;
            }

            let in_folder = sequence
                .iter()
                .any(|f| f.is_folder() && record.is_member_of(&f.id));
            if !in_folder {
                collapsed = None;
                println!("{:>3}  {}", index, display_name(record));
            } else if all || collapsed.is_none() {
                println!("{:>3}      {}", index, display_name(record));
            }
        }
    }
}

fn display_name(record: &Record) -> &str {
    record.name().unwrap_or("(unnamed)")
}

/// Errors from list commands
#[derive(Debug)]
pub enum ListError {
    NoSuchIndex { index: usize, len: usize },
    NotAFolder(usize),
    Store(StoreError),
}

impl std::fmt::Display for ListError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ListError::NoSuchIndex { index, len } => write!(
                f,
                "No item at index {} ({} item{}). Run 'lists ls' to see indices.",
                index,
                len,
                if *len == 1 { "" } else { "s" }
            ),
            ListError::NotAFolder(index) => write!(f, "Item {} is not a folder", index),
            ListError::Store(e) => write!(f, "{}", e),
        }
    }
}

impl std::error::Error for ListError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            ListError::Store(e) => Some(e),
            _ => None,
        }
    }
}

impl From<StoreError> for ListError {
    fn from(e: StoreError) -> Self {
        ListError::Store(e)
    }
}
