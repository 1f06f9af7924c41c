mod common;

use axum::http::StatusCode;
use serde_json::{json, Value};

fn events_of(body: &Value, kind: &str) -> Vec<Value> {
    body["events"]
        .as_array()
        .unwrap()
        .iter()
        .filter(|e| e["type"] == kind)
        .cloned()
        .collect()
}

#[tokio::test]
async fn test_correct_answer_awards_xp_and_records_progress() {
    let app = common::create_test_app();
    let identity = app.register("Ada", "ada@example.com").await;
    let qid = app.insert_question("What is a bill of lading?", 1, "Logistics", Some("Bill of Lading")).await;

    let (status, body) = app.answer(&identity, qid, " a ").await;

    assert_eq!(status, StatusCode::OK, "{}", body);
    assert_eq!(body["outcome"], "WIN");
    assert_eq!(body["correct_label"], "A");
    assert_eq!(body["profile"]["xp"], 20);
    assert_eq!(body["profile"]["total_score"], 20);
    assert_eq!(body["profile"]["questions_answered"], 1);
    assert_eq!(body["profile"]["streak"], 1);
    assert_eq!(body["profile"]["lives"], 3);
    assert_eq!(events_of(&body, "glossary_term_added").len(), 1);

    let (status, stats) = app
        .send("GET", &format!("/api/v1/learners/{}/stats", identity), None)
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(stats["solved"], 1);
    assert_eq!(stats["glossary_terms"], 1);
    assert_eq!(stats["categories"][0]["category"], "Logistics");
    assert_eq!(stats["categories"][0]["correct_count"], 1);

    let (_, glossary) = app
        .send("GET", &format!("/api/v1/learners/{}/glossary", identity), None)
        .await;
    assert_eq!(glossary[0]["term"], "Bill of Lading");
}

#[tokio::test]
async fn test_wrong_answer_costs_a_life_and_resets_streak() {
    let app = common::create_test_app();
    let identity = app.register("Ada", "ada@example.com").await;
    let first = app.insert_question("Q1", 1, "Logistics", None).await;
    let second = app.insert_question("Q2", 1, "Logistics", None).await;

    let (_, body) = app.answer(&identity, first, "A").await;
    assert_eq!(body["profile"]["streak"], 1);

    let (status, body) = app.answer(&identity, second, "B").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["outcome"], "LOSS");
    assert_eq!(body["profile"]["lives"], 2);
    assert_eq!(body["profile"]["streak"], 0);
    assert_eq!(body["profile"]["xp"], 20);
    assert_eq!(body["profile"]["questions_answered"], 1);
}

#[tokio::test]
async fn test_five_correct_answers_in_a_row() {
    let app = common::create_test_app();
    let identity = app.register("Ada", "ada@example.com").await;
    let mut ids = Vec::new();
    for i in 0..5 {
        ids.push(
            app.insert_question(&format!("Streak question {}", i), 1, "Purchasing", None)
                .await,
        );
    }

    let mut last = Value::Null;
    for qid in ids {
        let (status, body) = app.answer(&identity, qid, "A").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["outcome"], "WIN");
        last = body;
    }

    assert_eq!(last["profile"]["xp"], 100);
    assert_eq!(last["profile"]["questions_answered"], 5);
    assert_eq!(last["profile"]["level"], 1);
    assert_eq!(last["profile"]["lives"], 4);
    assert_eq!(last["profile"]["streak"], 0);
    let restored = events_of(&last, "life_restored");
    assert_eq!(restored.len(), 1);
    assert_eq!(restored[0]["lives"], 4);
}

#[tokio::test]
async fn test_streak_life_is_capped_at_max() {
    let app = common::create_test_app();
    let identity = app.register("Ada", "ada@example.com").await;
    app.update_profile(&identity, move |p| {
        p.lives = 5;
        p.streak = 4;
    }).await;
    let qid = app.insert_question("Cap question", 1, "Logistics", None).await;

    let (_, body) = app.answer(&identity, qid, "A").await;

    assert_eq!(body["profile"]["lives"], 5);
    assert_eq!(body["profile"]["streak"], 0);
    assert!(events_of(&body, "life_restored").is_empty());
}

#[tokio::test]
async fn test_level_up_at_threshold_resets_mastery() {
    let app = common::create_test_app();
    let identity = app.register("Ada", "ada@example.com").await;
    app.update_profile(&identity, move |p| {
        p.questions_answered = 119;
        p.recompute_progress();
    }).await;
    assert_eq!(app.profile(&identity).await.level, 1);
    let qid = app.insert_question("Threshold question", 1, "Logistics", None).await;

    let (_, body) = app.answer(&identity, qid, "A").await;

    assert_eq!(body["profile"]["questions_answered"], 120);
    assert_eq!(body["profile"]["level"], 2);
    assert_eq!(body["profile"]["mastery"], 0);
    let level_up = events_of(&body, "level_up");
    assert_eq!(level_up.len(), 1);
    assert_eq!(level_up[0]["from"], 1);
    assert_eq!(level_up[0]["to"], 2);
}

#[tokio::test]
async fn test_last_life_locks_out_until_remediation() {
    let app = common::create_test_app();
    let identity = app.register("Ada", "ada@example.com").await;
    app.update_profile(&identity, move |p| p.lives = 1).await;
    let first = app.insert_question("Lockout 1", 1, "Logistics", None).await;
    let second = app.insert_question("Lockout 2", 1, "Logistics", None).await;

    let (_, body) = app.answer(&identity, first, "C").await;
    assert_eq!(body["profile"]["lives"], 0);

    let (status, body) = app.answer(&identity, second, "A").await;
    assert_eq!(status, StatusCode::FORBIDDEN, "{}", body);

    let (status, _) = app
        .send("GET", &format!("/api/v1/learners/{}/question", identity), None)
        .await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let (status, body) = app
        .send("POST", &format!("/api/v1/learners/{}/grace", identity), None)
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["lives"], 1);
    assert_eq!(body["redemptions"], 1);

    // Remediation is refused once the learner has lives again.
    let (status, _) = app
        .send("POST", &format!("/api/v1/learners/{}/grace", identity), None)
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, body) = app.answer(&identity, second, "A").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["outcome"], "WIN");
}

#[tokio::test]
async fn test_restock_trades_xp_for_lives() {
    let app = common::create_test_app();
    let identity = app.register("Ada", "ada@example.com").await;
    app.update_profile(&identity, move |p| {
        p.lives = 0;
        p.xp = 60;
    }).await;

    let (status, _) = app
        .send("POST", &format!("/api/v1/learners/{}/restock", identity), None)
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    app.update_profile(&identity, move |p| p.xp = 150).await;
    let (status, body) = app
        .send("POST", &format!("/api/v1/learners/{}/restock", identity), None)
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["lives"], 3);
    assert_eq!(body["xp"], 50);
}

#[tokio::test]
async fn test_solved_question_is_never_served_again() {
    let app = common::create_test_app();
    let identity = app.register("Ada", "ada@example.com").await;
    let qid = app.insert_question("Only question", 1, "Logistics", None).await;

    let (_, body) = app
        .send("GET", &format!("/api/v1/learners/{}/question", identity), None)
        .await;
    assert_eq!(body["question"]["id"], qid);
    assert_eq!(body["source"], "bank");
    assert!(body["question"].get("correct").is_none());

    app.answer(&identity, qid, "A").await;

    let (status, body) = app
        .send("GET", &format!("/api/v1/learners/{}/question", identity), None)
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_ne!(body["question"]["id"], qid);
    assert_eq!(body["source"], "static");
}

#[tokio::test]
async fn test_jokers_are_limited() {
    let app = common::create_test_app();
    let identity = app.register("Ada", "ada@example.com").await;
    let qid = app.insert_question("Joker question", 1, "Logistics", None).await;
    let uri = format!("/api/v1/learners/{}/jokers/fifty_fifty", identity);

    let (status, body) = app.send("POST", &uri, Some(json!({ "question_id": qid }))).await;
    assert_eq!(status, StatusCode::OK, "{}", body);
    assert_eq!(body["remaining"], 2);
    let options = body["effect"]["remaining_options"].as_array().unwrap();
    assert_eq!(options.len(), 2);
    assert!(options.iter().any(|o| o["label"] == "A"));

    app.send("POST", &uri, Some(json!({ "question_id": qid }))).await;
    app.send("POST", &uri, Some(json!({ "question_id": qid }))).await;
    let (status, _) = app.send("POST", &uri, Some(json!({ "question_id": qid }))).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, body) = app
        .send(
            "POST",
            &format!("/api/v1/learners/{}/jokers/hint", identity),
            Some(json!({ "question_id": qid })),
        )
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["effect"]["kind"], "hint");
    assert_eq!(body["remaining"], 2);
}

#[tokio::test]
async fn test_unknown_question_is_not_found() {
    let app = common::create_test_app();
    let identity = app.register("Ada", "ada@example.com").await;

    let (status, body) = app.answer(&identity, 9999, "A").await;

    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["status"], 404);
}
