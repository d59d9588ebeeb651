//! Persistence module split across logical submodules.

mod accounts;
mod books;
mod connection;
mod dictionary;
mod transfer;

pub use accounts::{create_user, find_user_by_credentials, username};
pub use books::{add_book, delete_book, edit_book, get_book, list_statuses, search_books};
pub use connection::Catalog;
pub use dictionary::{
    add_entry, delete_entry, edit_entry, entry_title, list_user_entries, search_entries,
};
pub use transfer::{
    clear_user_catalog, export_records, export_to_path, import_from_path, import_records,
    read_csv, write_csv, CSV_HEADER,
};
