mod common;

use axum::http::StatusCode;
use mentor_api::models::mirror::{CategoryStatRow, GlossaryRow, MirrorTable, ProfileRow, SolvedRow};
use mentor_api::models::profile::UserProfile;
use mentor_api::services::remote::RemoteStore;
use mongodb::bson::{doc, to_document};
use serde_json::json;

const IDENTITY: &str = "3f0c8f4e-6c1a-4b7e-9a55-0d6f3f1b2c11";

/// Remote state left behind by another device.
async fn seed_remote(app: &common::TestApp) {
    let mut profile = UserProfile::new(IDENTITY, "Noor", "noor@example.com");
    profile.xp = 300;
    profile.total_score = 300;
    profile.questions_answered = 15;
    profile.crisis_wins = 2;
    profile.lives = 4;
    let row = ProfileRow::from(&profile);

    let mirror: &dyn RemoteStore = app.mirror.as_ref();
    mirror
        .upsert(
            MirrorTable::Profiles,
            doc! { "identity": IDENTITY },
            to_document(&row).unwrap(),
        )
        .await
        .unwrap();

    for fingerprint in ["fp-one", "fp-two"] {
        let solved = SolvedRow {
            identity: IDENTITY.to_string(),
            fingerprint: fingerprint.to_string(),
        };
        mirror
            .upsert(
                MirrorTable::Solved,
                doc! { "identity": IDENTITY, "fingerprint": fingerprint },
                to_document(&solved).unwrap(),
            )
            .await
            .unwrap();
    }

    let stat = CategoryStatRow {
        identity: IDENTITY.to_string(),
        category: "Logistics".to_string(),
        correct_count: 9,
    };
    mirror
        .upsert(
            MirrorTable::CategoryStats,
            doc! { "identity": IDENTITY, "category": "Logistics" },
            to_document(&stat).unwrap(),
        )
        .await
        .unwrap();

    let term = GlossaryRow {
        identity: IDENTITY.to_string(),
        term: "Cross-docking".to_string(),
        definition: "Transfer without storage".to_string(),
        category: "Logistics".to_string(),
    };
    mirror
        .upsert(
            MirrorTable::Glossary,
            doc! { "identity": IDENTITY, "term": "Cross-docking" },
            to_document(&term).unwrap(),
        )
        .await
        .unwrap();
}

#[tokio::test]
async fn test_resume_on_fresh_device_restores_remote_state() {
    let app = common::create_test_app();
    seed_remote(&app).await;

    let (status, body) = app
        .send("POST", "/api/v1/sessions/resume", Some(json!({ "identity": IDENTITY })))
        .await;

    assert_eq!(status, StatusCode::OK, "{}", body);
    assert_eq!(body["restored_from_mirror"], true);
    assert_eq!(body["profile"]["xp"], 300);
    assert_eq!(body["profile"]["crisis_wins"], 2);
    assert_eq!(body["profile"]["lives"], 4);

    let (_, stats) = app
        .send("GET", &format!("/api/v1/learners/{}/stats", IDENTITY), None)
        .await;
    assert_eq!(stats["solved"], 2);
    assert_eq!(stats["glossary_terms"], 1);
    assert_eq!(stats["categories"][0]["correct_count"], 9);
}

#[tokio::test]
async fn test_repeated_pull_does_not_duplicate_rows() {
    let app = common::create_test_app();
    seed_remote(&app).await;
    let resume = json!({ "identity": IDENTITY });

    app.send("POST", "/api/v1/sessions/resume", Some(resume.clone())).await;
    app.send("POST", "/api/v1/sessions/resume", Some(resume)).await;

    let (_, stats) = app
        .send("GET", &format!("/api/v1/learners/{}/stats", IDENTITY), None)
        .await;
    assert_eq!(stats["solved"], 2);
    assert_eq!(stats["glossary_terms"], 1);
    assert_eq!(stats["categories"][0]["correct_count"], 9);
}

#[tokio::test]
async fn test_login_by_email_finds_remote_identity() {
    let app = common::create_test_app();
    seed_remote(&app).await;

    let (status, body) = app
        .send("POST", "/api/v1/sessions/login", Some(json!({ "email": "Noor@Example.com" })))
        .await;

    assert_eq!(status, StatusCode::OK, "{}", body);
    assert_eq!(body["profile"]["identity"], IDENTITY);
    assert_eq!(body["profile"]["xp"], 300);
}

#[tokio::test]
async fn test_unreachable_mirror_keeps_local_state() {
    let app = common::create_test_app();
    let identity = app.register("Noor", "noor@example.com").await;
    app.update_profile(&identity, move |p| p.xp = 40).await;
    app.mirror.set_fail_reads(true);

    let (status, body) = app
        .send("POST", "/api/v1/sessions/resume", Some(json!({ "identity": identity })))
        .await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["restored_from_mirror"], false);
    assert_eq!(body["profile"]["xp"], 40);
}

#[tokio::test]
async fn test_answers_are_mirrored() {
    let app = common::create_test_app();
    let identity = app.register("Noor", "noor@example.com").await;
    let qid = app.insert_question("What is cross-docking?", 1, "Logistics", Some("Cross-docking")).await;

    app.answer(&identity, qid, "A").await;
    app.drain_replication().await;

    let profiles = app.mirror.rows(MirrorTable::Profiles);
    let row = profiles
        .iter()
        .find(|r| r.get_str("identity").ok() == Some(identity.as_str()))
        .expect("profile mirrored");
    let row: ProfileRow = mongodb::bson::from_document(row.clone()).unwrap();
    assert_eq!(row.xp, 20);
    assert_eq!(row.questions_answered, 1);

    assert_eq!(app.mirror.rows(MirrorTable::Solved).len(), 1);
    assert_eq!(app.mirror.rows(MirrorTable::CategoryStats).len(), 1);
    assert_eq!(app.mirror.rows(MirrorTable::Glossary).len(), 1);
}

#[tokio::test]
async fn test_mirror_write_failure_does_not_fail_answer() {
    let app = common::create_test_app();
    let identity = app.register("Noor", "noor@example.com").await;
    let qid = app.insert_question("Offline question", 1, "Logistics", None).await;
    app.mirror.set_fail_writes(true);

    let (status, body) = app.answer(&identity, qid, "A").await;
    app.drain_replication().await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["outcome"], "WIN");
    assert_eq!(app.profile(&identity).await.xp, 20);
}

#[tokio::test]
async fn test_pulled_profile_keeps_local_crisis_out_of_mirror() {
    let app = common::create_test_app();
    seed_remote(&app).await;

    app.send("POST", "/api/v1/sessions/resume", Some(json!({ "identity": IDENTITY })))
        .await;

    for row in app.mirror.rows(MirrorTable::Profiles) {
        assert!(row.get("crisis").is_none());
    }
}
