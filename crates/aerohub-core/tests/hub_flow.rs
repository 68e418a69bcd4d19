use std::sync::Arc;

use bytes::Bytes;
use chrono::Utc;

use aerohub_core::{
    FeaturedConfig, ImageFile, ListingEngine, LiveryDraft, LoadStatus, ToggleOutcome, load_detail,
    load_featured, publish_livery, remove_livery,
};
use aerohub_gateway::memory::{MemoryGateway, Operation};
use aerohub_gateway::{EngagementKind, Gateway, Session};
use aerohub_types::listing::{ListingParams, SortField, SortOrder};
use aerohub_types::models::TextureId;

fn draft(title: &str, aircraft: &str, image: &[u8]) -> LiveryDraft {
    LiveryDraft {
        title: title.into(),
        description: None,
        aircraft: aircraft.into(),
        texture_ids: vec![TextureId {
            name: "Fuselage".into(),
            id: "1001".into(),
        }],
        advanced_customization: None,
        images: vec![ImageFile {
            file_name: "cover.jpg".into(),
            content_type: "image/jpeg".into(),
            bytes: Bytes::copy_from_slice(image),
        }],
    }
}

#[tokio::test]
async fn publish_browse_engage_and_remove() {
    let store = MemoryGateway::new();
    let author = store.signed_in("author");

    let eva = publish_livery(&author, draft("EVA Air Laminar", "A330-300", b"eva"))
        .await
        .unwrap();
    publish_livery(&author, draft("Mexicana Golden", "A320", b"mx"))
        .await
        .unwrap();

    // An anonymous visitor browses, then signs in through an upgraded client.
    let anonymous: Arc<dyn Gateway> = Arc::new(store.clone());
    let listing = ListingEngine::new(anonymous.clone(), ListingParams::default());
    assert!(listing.set_aircraft_filter(Some("A330-300")).await);
    let snapshot = listing.snapshot().await;
    assert_eq!(snapshot.status, LoadStatus::Loaded);
    assert_eq!(snapshot.items.len(), 1);
    assert_eq!(snapshot.items[0].id, eva.id);

    let visitor = anonymous.upgrade(Session::new("visitor", "visitor-token"));
    assert!(anonymous.session().is_none());

    let detail = load_detail(visitor.clone(), eva.id).await.unwrap();
    assert_eq!(detail.livery.views, 1);
    let outcome = detail.engagement.like().await.unwrap();
    assert!(matches!(outcome, ToggleOutcome::Confirmed(view) if view.active && view.count == 1));
    detail.engagement.save().await.unwrap();

    let stats = anonymous.user_stats("author").await;
    assert_eq!(stats.livery_count, 2);
    assert_eq!(stats.total_likes, 1);
    assert_eq!(stats.total_saves, 1);

    // Reopening the page reflects the stored membership.
    let reopened = load_detail(visitor, eva.id).await.unwrap();
    assert!(reopened.engagement.view(EngagementKind::Like).await.active);
    assert!(reopened.engagement.view(EngagementKind::Save).await.active);

    let featured = load_featured(anonymous.as_ref(), FeaturedConfig::default(), Utc::now())
        .await
        .unwrap();
    assert_eq!(featured[0].livery.id, eva.id);

    remove_livery(&author, eva.id).await.unwrap();
    assert!(listing.set_sort(SortField::Title, SortOrder::Asc).await);
    assert!(listing.set_aircraft_filter(None).await);
    let snapshot = listing.snapshot().await;
    assert_eq!(snapshot.total_count, 1);
    assert_eq!(snapshot.items[0].title, "Mexicana Golden");
    assert_eq!(store.calls(Operation::FetchLiveries), 4);
}
