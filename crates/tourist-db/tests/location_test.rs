use tourist_db::{
    CreateLocationRequest, Database, Error, LocationRepository, PhotoFields, PhotoRepository,
};
use uuid::Uuid;

async fn setup_db() -> Database {
    Database::in_memory()
        .await
        .expect("Failed to open in-memory database")
}

fn request(title: Option<&str>, latitude: f64, longitude: f64) -> CreateLocationRequest {
    CreateLocationRequest {
        title: title.map(str::to_string),
        latitude,
        longitude,
    }
}

#[tokio::test]
async fn test_create_and_fetch_location() {
    let db = setup_db().await;
    let created = db
        .locations
        .create(request(Some("Paris"), 48.8566, 2.3522))
        .await
        .unwrap();

    assert_eq!(created.id.get_version_num(), 7);
    let fetched = db.locations.fetch(created.id).await.unwrap();
    assert_eq!(fetched.title.as_deref(), Some("Paris"));
    assert_eq!(fetched.latitude, 48.8566);
    assert_eq!(fetched.longitude, 2.3522);
}

#[tokio::test]
async fn test_create_rejects_out_of_range_coordinates() {
    let db = setup_db().await;
    let err = db
        .locations
        .create(request(None, 91.0, 0.0))
        .await
        .unwrap_err();
    assert!(matches!(err, Error::InvalidArgument(_)));
    assert!(db.locations.list().await.unwrap().is_empty());
}

#[tokio::test]
async fn test_fetch_missing_location() {
    let db = setup_db().await;
    let id = Uuid::new_v4();
    assert!(db.locations.get(id).await.unwrap().is_none());
    assert!(matches!(
        db.locations.fetch(id).await,
        Err(Error::LocationNotFound(missing)) if missing == id
    ));
}

#[tokio::test]
async fn test_list_orders_by_title_descending_untitled_last() {
    let db = setup_db().await;
    db.locations.create(request(None, 0.0, 0.0)).await.unwrap();
    db.locations
        .create(request(Some("Berlin"), 52.52, 13.405))
        .await
        .unwrap();
    db.locations
        .create(request(Some("Tokyo"), 35.6762, 139.6503))
        .await
        .unwrap();
    db.locations
        .create(request(Some("Lima"), -12.0464, -77.0428))
        .await
        .unwrap();

    let titles: Vec<_> = db
        .locations
        .list()
        .await
        .unwrap()
        .into_iter()
        .map(|l| l.title)
        .collect();
    assert_eq!(
        titles,
        vec![
            Some("Tokyo".to_string()),
            Some("Lima".to_string()),
            Some("Berlin".to_string()),
            None
        ]
    );
}

#[tokio::test]
async fn test_set_title() {
    let db = setup_db().await;
    let location = db.locations.create(request(None, 1.0, 1.0)).await.unwrap();

    db.locations
        .set_title(location.id, Some("Null Island"))
        .await
        .unwrap();
    assert_eq!(
        db.locations.fetch(location.id).await.unwrap().title.as_deref(),
        Some("Null Island")
    );

    let err = db
        .locations
        .set_title(Uuid::new_v4(), Some("x"))
        .await
        .unwrap_err();
    assert!(matches!(err, Error::LocationNotFound(_)));
}

#[tokio::test]
async fn test_move_and_delete_rejected_while_photos_exist() {
    let db = setup_db().await;
    let location = db
        .locations
        .create(request(Some("Paris"), 48.8566, 2.3522))
        .await
        .unwrap();
    let photo = db
        .photos
        .create(&location, PhotoFields::new("1", "2", "3", "4"))
        .await
        .unwrap();

    let err = db
        .locations
        .update_coordinates(location.id, 45.0, 5.0)
        .await
        .unwrap_err();
    assert!(matches!(err, Error::InvalidState(_)));
    assert!(matches!(
        db.locations.delete(location.id).await,
        Err(Error::InvalidState(_))
    ));

    db.photos.delete(&photo).await.unwrap();

    let moved = db
        .locations
        .update_coordinates(location.id, 45.0, 5.0)
        .await
        .unwrap();
    assert_eq!((moved.latitude, moved.longitude), (45.0, 5.0));

    db.locations.delete(location.id).await.unwrap();
    assert!(db.locations.get(location.id).await.unwrap().is_none());
}

#[tokio::test]
async fn test_delete_missing_location() {
    let db = setup_db().await;
    assert!(matches!(
        db.locations.delete(Uuid::new_v4()).await,
        Err(Error::LocationNotFound(_))
    ));
}

#[tokio::test]
async fn test_file_database_persists_across_connections() {
    let dir = tempfile::tempdir().unwrap();
    let url = format!("sqlite://{}", dir.path().join("tourist.db").display());

    let id = {
        let db = Database::connect(&url).await.unwrap();
        db.migrate().await.unwrap();
        let location = db
            .locations
            .create(request(Some("Paris"), 48.8566, 2.3522))
            .await
            .unwrap();
        db.pool.close().await;
        location.id
    };

    let db = Database::connect(&url).await.unwrap();
    db.migrate().await.unwrap();
    let location = db.locations.fetch(id).await.unwrap();
    assert_eq!(location.title.as_deref(), Some("Paris"));
}
