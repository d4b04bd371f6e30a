//! SQLite-backed remote, exercised against an in-memory database.

use std::sync::Arc;

use chrono::{DateTime, Duration, TimeZone, Utc};
use sqlx::SqlitePool;

use reply_tree::db::{self, NewUser, ProfileUpdate, SearchFilters, SqlRemote};
use reply_tree::error::{RemoteError, ValidationError};
use reply_tree::models::{ChildPage, DraftPayload, FollowState, Gender, NewPost, SubmitPayload, UpdatePost};
use reply_tree::remote::PostRemote;
use reply_tree::store::PostStore;

fn t(minutes: i64) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 6, 1, 9, 0, 0).unwrap() + Duration::minutes(minutes)
}

fn new_post(text: &str, parent_id: Option<&str>) -> NewPost {
    NewPost {
        text: text.to_string(),
        images: vec![],
        parent_id: parent_id.map(str::to_string),
    }
}

async fn setup() -> SqlitePool {
    let pool = db::init_db("sqlite::memory:", 1).await.expect("in-memory database");
    for (id, gender) in [("viewer", None), ("alice", Some(Gender::Female)), ("bob", Some(Gender::Male))] {
        db::upsert_user(
            &pool,
            &NewUser {
                id: id.to_string(),
                username: format!("{}_handle", id),
                name: Some(id.to_string()),
                surname: None,
                avatar: None,
                gender,
            },
        )
        .await
        .expect("user inserted");
    }
    pool
}

fn remote_for(pool: &SqlitePool, user_id: &str) -> SqlRemote {
    SqlRemote::new(pool.clone(), user_id)
}

fn page(parent_id: Option<&str>, take: usize, skip: usize) -> ChildPage {
    ChildPage {
        parent_id: parent_id.map(str::to_string),
        take,
        skip,
    }
}

#[tokio::test]
async fn feed_is_roots_newest_first() {
    let pool = setup().await;
    let alice = remote_for(&pool, "alice");
    let older = alice.insert_post_at(new_post("older", None), t(0)).await.unwrap();
    let newer = alice.insert_post_at(new_post("newer", None), t(5)).await.unwrap();
    alice
        .insert_post_at(new_post("a reply", Some(&older.id)), t(10))
        .await
        .unwrap();

    let viewer = remote_for(&pool, "viewer");
    let feed = viewer.fetch_children(page(None, 10, 0)).await.unwrap();

    let ids: Vec<&str> = feed.iter().map(|p| p.id.as_str()).collect();
    assert_eq!(ids, vec![newer.id.as_str(), older.id.as_str()]);
    assert!(feed.iter().all(|p| p.children.is_none()));
    assert_eq!(feed[1].reply_count, 1);
    assert_eq!(feed[0].author.username, "alice_handle");
    assert_eq!(feed[0].author.gender, Some(Gender::Female));
}

#[tokio::test]
async fn children_page_with_skip_and_take() {
    let pool = setup().await;
    let bob = remote_for(&pool, "bob");
    let root = bob.insert_post_at(new_post("root", None), t(0)).await.unwrap();
    let mut expected = Vec::new();
    for i in 1..=7 {
        let reply = bob
            .insert_post_at(new_post(&format!("reply {}", i), Some(&root.id)), t(i))
            .await
            .unwrap();
        expected.push(reply.id);
    }
    expected.reverse();

    let first = bob.fetch_children(page(Some(&root.id), 3, 0)).await.unwrap();
    let second = bob.fetch_children(page(Some(&root.id), 3, 3)).await.unwrap();
    let third = bob.fetch_children(page(Some(&root.id), 3, 6)).await.unwrap();

    let got: Vec<String> = first
        .iter()
        .chain(&second)
        .chain(&third)
        .map(|p| p.id.clone())
        .collect();
    assert_eq!(got, expected);
    assert_eq!(third.len(), 1);
}

#[tokio::test]
async fn like_toggles_on_and_off() {
    let pool = setup().await;
    let post = remote_for(&pool, "alice")
        .insert_post_at(new_post("like me", None), t(0))
        .await
        .unwrap();
    let viewer = remote_for(&pool, "viewer");

    viewer.toggle_like(&post.id).await.unwrap();
    let liked = viewer.fetch_children(page(None, 1, 0)).await.unwrap().remove(0);
    assert_eq!(liked.like_count, 1);
    assert!(liked.is_liked_by("viewer"));

    viewer.toggle_like(&post.id).await.unwrap();
    let unliked = viewer.fetch_children(page(None, 1, 0)).await.unwrap().remove(0);
    assert_eq!(unliked.like_count, 0);
    assert!(unliked.likes.is_empty());

    assert!(matches!(
        viewer.toggle_like("missing").await,
        Err(RemoteError::NotFound(_))
    ));
}

#[tokio::test]
async fn follow_requests_accept_and_unfollow() {
    let pool = setup().await;
    let alice = remote_for(&pool, "alice");
    alice.insert_post_at(new_post("hi", None), t(0)).await.unwrap();
    let viewer = remote_for(&pool, "viewer");

    let state = |pool: SqlitePool| async move {
        db::load_author(&pool, "alice")
            .await
            .unwrap()
            .unwrap()
            .follow_state("viewer")
    };

    viewer.toggle_follow("alice").await.unwrap();
    assert_eq!(state(pool.clone()).await, FollowState::Requested);

    viewer.toggle_follow("alice").await.unwrap();
    assert_eq!(state(pool.clone()).await, FollowState::NotFollowing);

    viewer.toggle_follow("alice").await.unwrap();
    assert_eq!(alice.received_follow_requests().await.unwrap(), vec!["viewer".to_string()]);
    alice.accept_follow_request("viewer").await.unwrap();
    assert_eq!(state(pool.clone()).await, FollowState::Following);
    assert!(alice.received_follow_requests().await.unwrap().is_empty());

    let feed = viewer.fetch_children(page(None, 1, 0)).await.unwrap();
    assert_eq!(feed[0].author.followings, vec!["viewer".to_string()]);

    viewer.toggle_follow("alice").await.unwrap();
    assert_eq!(state(pool.clone()).await, FollowState::NotFollowing);

    assert!(matches!(
        viewer.toggle_follow("viewer").await,
        Err(RemoteError::Forbidden(_))
    ));
}

#[tokio::test]
async fn declined_request_disappears() {
    let pool = setup().await;
    let bob = remote_for(&pool, "bob");
    remote_for(&pool, "viewer").toggle_follow("bob").await.unwrap();

    bob.decline_follow_request("viewer").await.unwrap();
    assert!(bob.received_follow_requests().await.unwrap().is_empty());

    let author = db::load_author(&pool, "bob").await.unwrap().unwrap();
    assert_eq!(author.follow_state("viewer"), FollowState::NotFollowing);
}

#[tokio::test]
async fn accepting_without_request_is_a_no_op() {
    let pool = setup().await;
    let bob = remote_for(&pool, "bob");
    bob.accept_follow_request("viewer").await.unwrap();

    let author = db::load_author(&pool, "bob").await.unwrap().unwrap();
    assert!(author.followings.is_empty());
}

#[tokio::test]
async fn block_toggles() {
    let pool = setup().await;
    let viewer = remote_for(&pool, "viewer");

    viewer.toggle_block("bob").await.unwrap();
    assert!(viewer.is_blocked("bob").await.unwrap());
    viewer.toggle_block("bob").await.unwrap();
    assert!(!viewer.is_blocked("bob").await.unwrap());
    assert!(viewer.toggle_block("viewer").await.is_err());
}

#[tokio::test]
async fn delete_cascades_and_checks_author() {
    let pool = setup().await;
    let alice = remote_for(&pool, "alice");
    let bob = remote_for(&pool, "bob");
    let root = alice.insert_post_at(new_post("root", None), t(0)).await.unwrap();
    let child = bob
        .insert_post_at(new_post("child", Some(&root.id)), t(1))
        .await
        .unwrap();
    bob.insert_post_at(new_post("grandchild", Some(&child.id)), t(2))
        .await
        .unwrap();

    assert!(matches!(
        alice.delete_post(&child.id).await,
        Err(RemoteError::Forbidden(_))
    ));

    bob.delete_post(&child.id).await.unwrap();
    let (remaining,): (i64,) = sqlx::query_as("SELECT COUNT(*) FROM posts")
        .fetch_one(&pool)
        .await
        .unwrap();
    assert_eq!(remaining, 1);

    assert!(matches!(
        bob.delete_post(&child.id).await,
        Err(RemoteError::NotFound(_))
    ));
}

#[tokio::test]
async fn update_validates_and_checks_author() {
    let pool = setup().await;
    let alice = remote_for(&pool, "alice");
    let post = alice.insert_post_at(new_post("draft", None), t(0)).await.unwrap();

    let update = |text: &str, images: usize| UpdatePost {
        post_id: post.id.clone(),
        text: text.to_string(),
        images: (0..images).map(|i| format!("https://img/{}", i)).collect(),
    };

    let saved = alice.update_post(update("final", 2)).await.unwrap();
    assert_eq!(saved.text, "final");
    assert_eq!(saved.images.len(), 2);
    assert!(saved.updated_at > saved.created_at);

    assert!(matches!(
        alice.update_post(update("x", 9)).await,
        Err(RemoteError::Validation(ValidationError::TooManyImages { count: 9, max: 8 }))
    ));
    assert!(matches!(
        remote_for(&pool, "bob").update_post(update("mine now", 0)).await,
        Err(RemoteError::Forbidden(_))
    ));
}

#[tokio::test]
async fn create_rejects_bad_input() {
    let pool = setup().await;
    let viewer = remote_for(&pool, "viewer");

    assert!(matches!(
        viewer.create_post(new_post(&"x".repeat(281), None)).await,
        Err(RemoteError::Validation(ValidationError::TextTooLong { .. }))
    ));
    assert!(matches!(
        viewer.create_post(new_post("orphan", Some("missing"))).await,
        Err(RemoteError::NotFound(_))
    ));
}

#[tokio::test]
async fn anonymous_remote_is_refused() {
    let pool = setup().await;
    let anonymous = SqlRemote::anonymous(pool);

    assert!(matches!(
        anonymous.fetch_children(page(None, 10, 0)).await,
        Err(RemoteError::Unauthenticated)
    ));
    assert!(matches!(
        anonymous.create_post(new_post("hello", None)).await,
        Err(RemoteError::Unauthenticated)
    ));
}

#[tokio::test]
async fn upsert_updates_profile_fields() {
    let pool = setup().await;
    db::upsert_user(
        &pool,
        &NewUser {
            id: "bob".to_string(),
            username: "bobby".to_string(),
            name: Some("Bob".to_string()),
            surname: Some("Builder".to_string()),
            avatar: Some("https://cdn/bob.png".to_string()),
            gender: Some(Gender::Male),
        },
    )
    .await
    .unwrap();

    let bob = db::load_author(&pool, "bob").await.unwrap().unwrap();
    assert_eq!(bob.username, "bobby");
    assert_eq!(bob.display_name(), "Bob Builder");
    assert_eq!(bob.avatar_src(), "https://cdn/bob.png");
    assert!(db::load_author(&pool, "nobody").await.unwrap().is_none());
}

#[tokio::test]
async fn store_over_sqlite_end_to_end() {
    let pool = setup().await;
    let alice = remote_for(&pool, "alice");
    let root = alice.insert_post_at(new_post("root", None), t(0)).await.unwrap();
    for i in 1..=3 {
        alice
            .insert_post_at(new_post(&format!("reply {}", i), Some(&root.id)), t(i))
            .await
            .unwrap();
    }

    let viewer = db::load_author(&pool, "viewer").await.unwrap();
    let mut store = PostStore::new(Arc::new(remote_for(&pool, "viewer")), viewer, Vec::new()).unwrap();
    store.load_more_posts(10);
    store.settle().await;
    store.load_more_children(&root.id, 2);
    store.settle().await;
    assert_eq!(store.find(&root.id).unwrap().loaded_children(), 2);

    store.init_reply(&root.id);
    let draft_id = store.draft().unwrap().post_id().to_string();
    store.set_reply_state(&draft_id, DraftPayload { text: Some("from the store".to_string()) });
    store.submit_reply(&draft_id, SubmitPayload::default());
    store.toggle_like(&root.id);
    store.toggle_follow(&root.id);
    store.settle().await;

    assert!(store.draft().is_none());
    let root_node = store.find(&root.id).unwrap();
    assert_eq!(root_node.reply_count, 4);
    assert_eq!(root_node.like_count, 1);
    assert_eq!(root_node.children.as_ref().unwrap()[0].text, "from the store");
    assert_eq!(
        root_node.author.follow_state("viewer"),
        FollowState::Requested
    );

    let (stored,): (i64,) =
        sqlx::query_as("SELECT COUNT(*) FROM posts WHERE parent_id = ? AND author_id = 'viewer'")
            .bind(&root.id)
            .fetch_one(&pool)
            .await
            .unwrap();
    assert_eq!(stored, 1);
}

#[tokio::test]
async fn padded_text_is_validated_as_stored() {
    let pool = setup().await;
    let viewer = remote_for(&pool, "viewer");
    let body = "a".repeat(280);

    let created = viewer
        .create_post(new_post(&format!("  {}\n", body), None))
        .await
        .unwrap();
    assert_eq!(created.text, body);

    let edited = viewer
        .update_post(UpdatePost {
            post_id: created.id.clone(),
            text: format!("\t{} ", "b".repeat(280)),
            images: vec![],
        })
        .await
        .unwrap();
    assert_eq!(edited.text, "b".repeat(280));
}

#[tokio::test]
async fn unreadable_images_are_an_error() {
    let pool = setup().await;
    let post = remote_for(&pool, "alice")
        .insert_post_at(new_post("pics", None), t(0))
        .await
        .unwrap();
    sqlx::query("UPDATE posts SET images = 'not json' WHERE id = ?")
        .bind(&post.id)
        .execute(&pool)
        .await
        .unwrap();

    assert!(matches!(
        remote_for(&pool, "viewer").fetch_children(page(None, 10, 0)).await,
        Err(RemoteError::Other(_))
    ));
}

fn usernames(page: &reply_tree::db::SearchPage<reply_tree::AuthorSnapshot>) -> Vec<&str> {
    page.items.iter().map(|user| user.username.as_str()).collect()
}

fn filters(query: &str) -> SearchFilters {
    SearchFilters {
        query: query.to_string(),
        ..SearchFilters::default()
    }
}

#[tokio::test]
async fn user_search_matches_names_case_insensitively() {
    let pool = setup().await;
    let viewer = remote_for(&pool, "viewer");

    let everyone = viewer.search_users(1, &filters("")).await.unwrap();
    assert_eq!(usernames(&everyone), vec!["alice_handle", "bob_handle"]);
    assert_eq!(everyone.total_pages, 1);

    let alice = viewer.search_users(1, &filters("ALICE")).await.unwrap();
    assert_eq!(usernames(&alice), vec!["alice_handle"]);

    let by_name = viewer.search_users(1, &filters("bo")).await.unwrap();
    assert_eq!(usernames(&by_name), vec!["bob_handle"]);

    let wildcard = viewer.search_users(1, &filters("%")).await.unwrap();
    assert!(wildcard.items.is_empty());
    assert_eq!(wildcard.total_pages, 0);
}

#[tokio::test]
async fn user_search_hides_blocked_and_connected_users() {
    let pool = setup().await;
    let viewer = remote_for(&pool, "viewer");
    let alice = remote_for(&pool, "alice");
    let bob = remote_for(&pool, "bob");

    viewer.toggle_block("bob").await.unwrap();
    let unblocked_only = viewer.search_users(1, &filters("")).await.unwrap();
    assert_eq!(usernames(&unblocked_only), vec!["alice_handle"]);
    let with_blocked = SearchFilters {
        include_blocked: true,
        ..filters("")
    };
    let all = viewer.search_users(1, &with_blocked).await.unwrap();
    assert_eq!(usernames(&all), vec!["alice_handle", "bob_handle"]);

    // viewer follows alice
    viewer.toggle_follow("alice").await.unwrap();
    alice.accept_follow_request("viewer").await.unwrap();
    let found = viewer.search_users(1, &with_blocked).await.unwrap();
    assert_eq!(usernames(&found), vec!["bob_handle"]);

    // bob follows viewer
    viewer.toggle_block("bob").await.unwrap();
    bob.toggle_follow("viewer").await.unwrap();
    viewer.accept_follow_request("bob").await.unwrap();
    let followings = SearchFilters {
        include_followings: true,
        ..filters("")
    };
    let found = viewer.search_users(1, &followings).await.unwrap();
    assert_eq!(usernames(&found), vec!["alice_handle"]);

    let connected = SearchFilters {
        include_followers: true,
        include_followings: true,
        ..filters("")
    };
    let found = viewer.search_users(1, &connected).await.unwrap();
    assert_eq!(usernames(&found), vec!["alice_handle", "bob_handle"]);
}

#[tokio::test]
async fn media_search_pages_and_skips_blocked_authors() {
    let pool = setup().await;
    let alice = remote_for(&pool, "alice");
    let bob = remote_for(&pool, "bob");
    for i in 0..3 {
        alice
            .insert_post_at(
                NewPost {
                    text: format!("album {}", i),
                    images: (0..8).map(|j| format!("alice/{}/{}", i, j)).collect(),
                    parent_id: None,
                },
                t(i),
            )
            .await
            .unwrap();
    }
    alice.insert_post_at(new_post("no pictures", None), t(5)).await.unwrap();
    bob.insert_post_at(
        NewPost {
            text: "Sunset at the pier".to_string(),
            images: vec!["bob/0".to_string(), "bob/1".to_string()],
            parent_id: None,
        },
        t(10),
    )
    .await
    .unwrap();

    let viewer = remote_for(&pool, "viewer");
    let first = viewer.search_media(1, &filters("")).await.unwrap();
    assert_eq!(first.items.len(), 24);
    assert_eq!(first.total_pages, 2);
    assert_eq!(&first.items[..3], &["bob/0", "bob/1", "alice/2/0"]);
    let second = viewer.search_media(2, &filters("")).await.unwrap();
    assert_eq!(second.items, vec!["alice/0/6", "alice/0/7"]);

    let sunset = viewer.search_media(1, &filters("sunset")).await.unwrap();
    assert_eq!(sunset.items, vec!["bob/0", "bob/1"]);
    let by_author = viewer.search_media(1, &filters("ALICE")).await.unwrap();
    assert_eq!(by_author.items.len(), 24);
    assert_eq!(by_author.total_pages, 1);

    viewer.toggle_block("bob").await.unwrap();
    let without_bob = viewer.search_media(1, &filters("")).await.unwrap();
    assert_eq!(without_bob.total_pages, 1);
    assert!(without_bob.items.iter().all(|url| url.starts_with("alice/")));

    let with_blocked = SearchFilters {
        include_blocked: true,
        ..filters("")
    };
    let everything = viewer.search_media(2, &with_blocked).await.unwrap();
    assert_eq!(everything.items.len(), 2);
}

#[tokio::test]
async fn profile_update_rejects_taken_usernames() {
    let pool = setup().await;
    let viewer = remote_for(&pool, "viewer");
    let update = |username: &str, surname: &str| ProfileUpdate {
        username: username.to_string(),
        name: "Vi".to_string(),
        surname: surname.to_string(),
        avatar: None,
        gender: Some(Gender::Other),
    };

    let saved = viewer.update_profile(update(" vi_ewer ", "Ewer")).await.unwrap();
    assert_eq!(saved.username, "vi_ewer");
    assert_eq!(saved.display_name(), "Vi Ewer");
    assert_eq!(saved.gender, Some(Gender::Other));

    assert!(matches!(
        viewer.update_profile(update("alice_handle", "Ewer")).await,
        Err(RemoteError::UsernameTaken)
    ));
    assert!(matches!(
        viewer.update_profile(update("vi_ewer", "  ")).await,
        Err(RemoteError::Validation(ValidationError::MissingField { field: "surname" }))
    ));
    assert!(matches!(
        SqlRemote::anonymous(pool.clone()).update_profile(update("ghost", "Ewer")).await,
        Err(RemoteError::Unauthenticated)
    ));

    let stored = db::load_author(&pool, "viewer").await.unwrap().unwrap();
    assert_eq!(stored.username, "vi_ewer");
}
