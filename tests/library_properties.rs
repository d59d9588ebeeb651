mod common;

use std::collections::BTreeMap;

use anyhow::Context;
use library_catalog::db::{
    add_book, add_entry, create_user, delete_book, delete_entry, entry_title, export_records,
    export_to_path, find_user_by_credentials, import_from_path, import_records,
    list_user_entries, read_csv, search_books,
};
use library_catalog::{BookFilters, CatalogError, CsvRecord, DictionaryKind, SortKey};

use common::open_catalog;

fn multiset(records: Vec<CsvRecord>) -> BTreeMap<CsvRecord, usize> {
    let mut counts = BTreeMap::new();
    for record in records {
        *counts.entry(record).or_insert(0) += 1;
    }
    counts
}

#[test]
fn genres_are_shared_across_users() -> anyhow::Result<()> {
    let dir = tempfile::tempdir()?;
    let catalog = open_catalog(dir.path())?;
    let user = create_user(&catalog, "alice", "pw")?;
    let user2 = create_user(&catalog, "bob", "pw")?;

    let first = add_entry(&catalog, DictionaryKind::Genre, user, "Fantasy")?;
    let second = add_entry(&catalog, DictionaryKind::Genre, user2, "fantasy")?;

    assert_eq!(first, second);
    assert_eq!(entry_title(&catalog, DictionaryKind::Genre, first)?, "fantasy");
    assert_eq!(list_user_entries(&catalog, DictionaryKind::Genre, user)?.len(), 1);
    assert_eq!(list_user_entries(&catalog, DictionaryKind::Genre, user2)?.len(), 1);
    Ok(())
}

#[test]
fn genre_in_use_cannot_be_unlinked_until_its_book_is_gone() -> anyhow::Result<()> {
    let dir = tempfile::tempdir()?;
    let catalog = open_catalog(dir.path())?;
    let user = create_user(&catalog, "alice", "pw")?;
    let other = create_user(&catalog, "bob", "pw")?;

    let sci_fi = add_entry(&catalog, DictionaryKind::Genre, user, "Sci-Fi")?;
    add_entry(&catalog, DictionaryKind::Genre, other, "sci-fi")?;
    let author = add_entry(&catalog, DictionaryKind::Author, user, "Herbert")?;
    let book = add_book(&catalog, user, "Dune", author, sci_fi, "read")?;

    let err = delete_entry(&catalog, DictionaryKind::Genre, user, sci_fi).unwrap_err();
    assert!(matches!(err, CatalogError::EntryInUse { .. }), "{err:?}");

    delete_book(&catalog, book)?;
    delete_entry(&catalog, DictionaryKind::Genre, user, sci_fi)?;

    assert!(list_user_entries(&catalog, DictionaryKind::Genre, user)?.is_empty());
    assert_eq!(entry_title(&catalog, DictionaryKind::Genre, sci_fi)?, "sci-fi");
    assert_eq!(list_user_entries(&catalog, DictionaryKind::Genre, other)?[0].id, sci_fi);
    Ok(())
}

#[test]
fn search_filters_and_sorting() -> anyhow::Result<()> {
    let dir = tempfile::tempdir()?;
    let catalog = open_catalog(dir.path())?;
    let user = create_user(&catalog, "alice", "pw")?;
    let herbert = add_entry(&catalog, DictionaryKind::Author, user, "Herbert")?;
    let asimov = add_entry(&catalog, DictionaryKind::Author, user, "Asimov")?;
    let scifi = add_entry(&catalog, DictionaryKind::Genre, user, "SciFi")?;
    add_book(&catalog, user, "Dune", herbert, scifi, "read")?;
    add_book(&catalog, user, "Foundation", asimov, scifi, "reading")?;
    add_book(&catalog, user, "Caves of Steel", asimov, scifi, "want to read")?;

    let by_genre = BookFilters::default().genre("scifi");
    let sort: SortKey = "title".parse()?;
    let titles: Vec<_> = search_books(&catalog, user, &by_genre, sort)?
        .into_iter()
        .map(|row| row.title)
        .collect();
    assert_eq!(titles, ["caves of steel", "dune", "foundation"]);

    let read_only = by_genre.clone().status("read");
    let rows = search_books(&catalog, user, &read_only, sort)?;
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0].title, "dune");

    // Ties on author fall back to insertion order.
    let by_author: SortKey = "author".parse()?;
    let titles: Vec<_> = search_books(&catalog, user, &by_genre, by_author)?
        .into_iter()
        .map(|row| row.title)
        .collect();
    assert_eq!(titles, ["foundation", "caves of steel", "dune"]);

    let err = "genre".parse::<SortKey>().unwrap_err();
    assert!(matches!(err, CatalogError::InvalidSortKey(_)));
    Ok(())
}

#[test]
fn export_then_import_into_fresh_user_round_trips() -> anyhow::Result<()> {
    let dir = tempfile::tempdir()?;
    let catalog = open_catalog(dir.path())?;
    let user = create_user(&catalog, "alice", "pw")?;
    let herbert = add_entry(&catalog, DictionaryKind::Author, user, "Herbert")?;
    let asimov = add_entry(&catalog, DictionaryKind::Author, user, "Asimov")?;
    let scifi = add_entry(&catalog, DictionaryKind::Genre, user, "SciFi")?;
    let essays = add_entry(&catalog, DictionaryKind::Genre, user, "Essays, Collected")?;
    add_book(&catalog, user, "Dune", herbert, scifi, "read")?;
    add_book(&catalog, user, "Dune", herbert, scifi, "read")?;
    add_book(&catalog, user, "Asimov on Science", asimov, essays, "want to read")?;

    let csv_path = dir.path().join("export.csv");
    assert_eq!(export_to_path(&catalog, user, &csv_path)?, 3);

    let fresh = create_user(&catalog, "bob", "pw")?;
    assert_eq!(import_from_path(&catalog, fresh, &csv_path)?, 3);

    assert_eq!(
        multiset(export_records(&catalog, fresh)?),
        multiset(export_records(&catalog, user)?)
    );

    // The same records imported in memory behave identically.
    let third = create_user(&catalog, "carol", "pw")?;
    import_records(&catalog, third, export_records(&catalog, user)?)?;
    assert_eq!(multiset(export_records(&catalog, third)?).len(), 2);
    Ok(())
}

#[test]
fn import_with_missing_status_column_wipes_then_fails() -> anyhow::Result<()> {
    let dir = tempfile::tempdir()?;
    let catalog = open_catalog(dir.path())?;
    let user = create_user(&catalog, "alice", "pw")?;
    let herbert = add_entry(&catalog, DictionaryKind::Author, user, "Herbert")?;
    let scifi = add_entry(&catalog, DictionaryKind::Genre, user, "SciFi")?;
    add_book(&catalog, user, "Dune", herbert, scifi, "read")?;

    let input = "Book,Author,Genre\nFoundation,Asimov,SciFi\n";
    let err = read_csv(&catalog, user, input.as_bytes()).unwrap_err();
    assert!(matches!(err, CatalogError::ImportError { .. }), "{err:?}");

    let rows = search_books(&catalog, user, &BookFilters::default(), SortKey::Title)?;
    assert!(rows.is_empty());
    Ok(())
}

#[test]
fn missing_import_file_erases_nothing() -> anyhow::Result<()> {
    let dir = tempfile::tempdir()?;
    let catalog = open_catalog(dir.path())?;
    let user = create_user(&catalog, "alice", "pw")?;
    let herbert = add_entry(&catalog, DictionaryKind::Author, user, "Herbert")?;
    let scifi = add_entry(&catalog, DictionaryKind::Genre, user, "SciFi")?;
    add_book(&catalog, user, "Dune", herbert, scifi, "read")?;

    let err = import_from_path(&catalog, user, dir.path().join("nope.csv")).unwrap_err();
    assert!(matches!(err, CatalogError::ImportError { line: 0, .. }));
    assert_eq!(export_records(&catalog, user)?.len(), 1);
    Ok(())
}

#[test]
fn data_survives_reopening_and_sessions_see_each_other() -> anyhow::Result<()> {
    let dir = tempfile::tempdir()?;
    let user = {
        let mut catalog = open_catalog(dir.path())?;
        let user = create_user(&catalog, "alice", "pw")?;
        add_entry(&catalog, DictionaryKind::Genre, user, "Poetry")?;
        catalog.close()?;
        catalog.close()?;
        user
    };

    let first = open_catalog(dir.path())?;
    let second = open_catalog(dir.path())?;
    assert_eq!(find_user_by_credentials(&first, "alice", "pw")?, user);

    let bob = create_user(&second, "bob", "pw")?;
    let from_second = add_entry(&second, DictionaryKind::Genre, bob, "POETRY")?;
    let from_first = list_user_entries(&first, DictionaryKind::Genre, user)?
        .first()
        .map(|entry| entry.id)
        .context("alice lost her genre")?;
    assert_eq!(from_first, from_second);
    Ok(())
}

#[test]
fn explicit_session_groups_operations() -> anyhow::Result<()> {
    let dir = tempfile::tempdir()?;
    let catalog = open_catalog(dir.path())?;
    let user = create_user(&catalog, "alice", "pw")?;

    catalog.begin()?;
    add_entry(&catalog, DictionaryKind::Author, user, "Tolkien")?;
    add_entry(&catalog, DictionaryKind::Genre, user, "Fantasy")?;
    catalog.rollback()?;
    assert!(list_user_entries(&catalog, DictionaryKind::Author, user)?.is_empty());

    catalog.begin()?;
    add_entry(&catalog, DictionaryKind::Author, user, "Tolkien")?;
    let err = add_entry(&catalog, DictionaryKind::Author, user, "tolkien").unwrap_err();
    assert!(matches!(err, CatalogError::DuplicateLink { .. }));
    catalog.commit()?;
    assert_eq!(list_user_entries(&catalog, DictionaryKind::Author, user)?.len(), 1);
    Ok(())
}
