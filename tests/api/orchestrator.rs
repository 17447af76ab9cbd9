use std::time::Duration;

use claims::assert_matches;
use claims::assert_none;
use list_uploader::batch::BatchOutcome;
use list_uploader::batch::PollError;
use list_uploader::domain::ApiKey;
use list_uploader::domain::Subscriber;
use list_uploader::domain::SubscriberEmail;
use list_uploader::marketing_client::RemoteCall;
use list_uploader::provisioning::Provisioning;
use list_uploader::upload::UploadError;
use list_uploader::upload::UploadOptions;
use list_uploader::upload::UploadRequest;
use secrecy::Secret;
use serde_json::json;
use serde_json::Value;
use wiremock::matchers::any;
use wiremock::matchers::body_partial_json;
use wiremock::matchers::method;
use wiremock::matchers::path;
use wiremock::Mock;
use wiremock::ResponseTemplate;

use crate::helpers::mount_batch_finished;
use crate::helpers::mount_create_list;
use crate::helpers::mount_no_provisioning;
use crate::helpers::mount_submit_batch;
use crate::helpers::spawn_app;
use crate::helpers::API_KEY;

fn api_key() -> ApiKey { ApiKey::parse(Secret::new(API_KEY.to_string())).unwrap() }

fn subscriber(email: &str) -> Subscriber {
    Subscriber::new(SubscriberEmail::parse(email.to_string()).unwrap())
}

fn spring_promo() -> UploadRequest {
    UploadRequest {
        list_name: Some("Spring Promo".to_string()),
        subscribers: vec![subscriber("a@x.com"), subscriber("b@x.com")],
    }
}

#[tokio::test]
async fn minimal_upload_end_to_end() {
    let app = spawn_app().await;
    let server = &app.marketing_server;

    Mock::given(path("/lists"))
        .and(method("POST"))
        .and(body_partial_json(json!({ "name": "Spring Promo" })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "id": "l1" })))
        .expect(1)
        .mount(server)
        .await;
    mount_no_provisioning(server).await;
    mount_submit_batch(server, "b1").await;
    mount_batch_finished(server, "b1", 0).await;

    let submission = app
        .orchestrator()
        .upload(
            spring_promo(),
            api_key(),
            UploadOptions {
                provisioning: Provisioning::Minimal,
                observe_completion: true,
            },
        )
        .await
        .unwrap();

    // first signal: accepted
    assert_eq!(submission.accepted.list.id, "l1");
    assert_eq!(submission.accepted.batch.id, "b1");

    let ops = app.submitted_operations().await;
    assert_eq!(ops.len(), 2);
    for (op, email) in ops.iter().zip(["a@x.com", "b@x.com"]) {
        assert_eq!(op["path"], "/lists/l1/members");
        let body: Value = serde_json::from_str(op["body"].as_str().unwrap()).unwrap();
        assert_eq!(body["email_address"], email);
    }
    assert_ne!(ops[0]["operation_id"], ops[1]["operation_id"]);

    // second signal: finished
    let outcome = submission.completion.unwrap().outcome().await.unwrap();
    assert_matches!(outcome, Ok(BatchOutcome::Ok(job)) if job.id == "b1");
}

#[tokio::test]
async fn full_provisioning_adds_merge_field_and_webhook() {
    let app = spawn_app().await;
    let server = &app.marketing_server;

    mount_create_list(server, "l1").await;
    Mock::given(path("/lists/l1/merge-fields"))
        .and(method("POST"))
        .and(body_partial_json(json!({ "tag": "GENDER", "type": "text" })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "merge_id": 3 })))
        .expect(1)
        .mount(server)
        .await;
    Mock::given(path("/lists/l1/webhooks"))
        .and(method("POST"))
        .and(body_partial_json(json!({
            "url": "http://crm.example.com/hook",
            "events": { "unsubscribe": true, "subscribe": false },
        })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "id": "w1" })))
        .expect(1)
        .mount(server)
        .await;
    mount_submit_batch(server, "b1").await;

    let submission = app
        .orchestrator()
        .upload(
            spring_promo(),
            api_key(),
            UploadOptions {
                provisioning: Provisioning::Full,
                observe_completion: false,
            },
        )
        .await
        .unwrap();
    assert_none!(submission.completion);
}

#[tokio::test]
async fn empty_upload_makes_no_calls() {
    let app = spawn_app().await;
    Mock::given(any())
        .respond_with(ResponseTemplate::new(200))
        .expect(0)
        .mount(&app.marketing_server)
        .await;

    let err = app
        .orchestrator()
        .upload(
            UploadRequest {
                list_name: Some("Spring Promo".to_string()),
                subscribers: vec![],
            },
            api_key(),
            UploadOptions::default(),
        )
        .await
        .unwrap_err();
    assert_matches!(err, UploadError::InvalidArgument(_));
}

#[tokio::test]
async fn blank_list_name_makes_no_calls() {
    let app = spawn_app().await;
    Mock::given(any())
        .respond_with(ResponseTemplate::new(200))
        .expect(0)
        .mount(&app.marketing_server)
        .await;

    let mut request = spring_promo();
    request.list_name = Some("   ".to_string());
    let err = app
        .orchestrator()
        .upload(request, api_key(), UploadOptions::default())
        .await
        .unwrap_err();
    assert_matches!(err, UploadError::InvalidArgument(_));
}

#[tokio::test]
async fn unnamed_list_gets_dated_name() {
    let app = spawn_app().await;
    mount_create_list(&app.marketing_server, "l1").await;
    mount_submit_batch(&app.marketing_server, "b1").await;

    let mut request = spring_promo();
    request.list_name = None;
    let submission = app
        .orchestrator()
        .upload(request, api_key(), UploadOptions::default())
        .await
        .unwrap();

    let name = submission.accepted.list.name.to_string();
    let today = chrono::Local::now().format("List %Y.%m.%d").to_string();
    assert_eq!(name, today);
}

#[tokio::test]
async fn failed_merge_field_aborts_upload() {
    let app = spawn_app().await;
    let server = &app.marketing_server;

    mount_create_list(server, "l1").await;
    Mock::given(path("/lists/l1/merge-fields"))
        .respond_with(ResponseTemplate::new(400).set_body_json(json!({
            "title": "Invalid Resource",
            "detail": "A Merge Field with the tag \"GENDER\" already exists for this list.",
        })))
        .expect(1)
        .mount(server)
        .await;
    Mock::given(path("/lists/l1/webhooks"))
        .respond_with(ResponseTemplate::new(200))
        .expect(0)
        .mount(server)
        .await;
    Mock::given(path("/batches"))
        .respond_with(ResponseTemplate::new(200))
        .expect(0)
        .mount(server)
        .await;

    let err = app
        .orchestrator()
        .upload(
            spring_promo(),
            api_key(),
            UploadOptions {
                provisioning: Provisioning::Full,
                observe_completion: true,
            },
        )
        .await
        .unwrap_err();
    assert_matches!(err, UploadError::RemoteService(e) if e.call == RemoteCall::AddMergeField);
}

#[tokio::test]
async fn failed_webhook_aborts_upload() {
    let app = spawn_app().await;
    let server = &app.marketing_server;

    mount_create_list(server, "l1").await;
    Mock::given(path("/lists/l1/merge-fields"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "merge_id": 3 })))
        .expect(1)
        .mount(server)
        .await;
    Mock::given(path("/lists/l1/webhooks"))
        .respond_with(ResponseTemplate::new(400).set_body_json(json!({
            "title": "Invalid Resource",
            "detail": "The resource submitted could not be validated.",
        })))
        .expect(1)
        .mount(server)
        .await;
    Mock::given(path("/batches"))
        .respond_with(ResponseTemplate::new(200))
        .expect(0)
        .mount(server)
        .await;

    let err = app
        .orchestrator()
        .upload(
            spring_promo(),
            api_key(),
            UploadOptions {
                provisioning: Provisioning::Full,
                observe_completion: true,
            },
        )
        .await
        .unwrap_err();
    assert_matches!(err, UploadError::RemoteService(e) if e.call == RemoteCall::AddWebhook);
}

#[tokio::test]
async fn rejected_batch_is_a_submission_failure() {
    let app = spawn_app().await;
    mount_create_list(&app.marketing_server, "l1").await;
    Mock::given(path("/batches"))
        .respond_with(ResponseTemplate::new(500))
        .expect(1)
        .mount(&app.marketing_server)
        .await;

    let err = app
        .orchestrator()
        .upload(spring_promo(), api_key(), UploadOptions::default())
        .await
        .unwrap_err();
    assert_matches!(err, UploadError::RemoteService(e) if e.call == RemoteCall::SubmitBatch);
}

#[tokio::test]
async fn errored_operations_reach_the_completion_handle() {
    let app = spawn_app().await;
    mount_create_list(&app.marketing_server, "l1").await;
    mount_submit_batch(&app.marketing_server, "b1").await;
    mount_batch_finished(&app.marketing_server, "b1", 1).await;

    let submission = app
        .orchestrator()
        .upload(
            spring_promo(),
            api_key(),
            UploadOptions {
                provisioning: Provisioning::Minimal,
                observe_completion: true,
            },
        )
        .await
        .unwrap();

    let outcome = submission.completion.unwrap().outcome().await.unwrap();
    assert_matches!(
        outcome,
        Ok(BatchOutcome::WithErrors {
            errored_operations: 1,
            ..
        })
    );
}

#[tokio::test]
async fn pending_then_finished() {
    let app = spawn_app().await;
    let server = &app.marketing_server;
    mount_create_list(server, "l1").await;
    mount_submit_batch(server, "b1").await;
    // mounted first, so it answers the first two checks
    Mock::given(path("/batches/b1"))
        .and(method("GET"))
        .respond_with(
            ResponseTemplate::new(200).set_body_json(json!({ "id": "b1", "status": "started" })),
        )
        .up_to_n_times(2)
        .expect(2)
        .mount(server)
        .await;
    mount_batch_finished(server, "b1", 0).await;

    let submission = app
        .orchestrator()
        .upload(
            spring_promo(),
            api_key(),
            UploadOptions {
                provisioning: Provisioning::Minimal,
                observe_completion: true,
            },
        )
        .await
        .unwrap();
    let outcome = submission.completion.unwrap().outcome().await.unwrap();
    assert_matches!(outcome, Ok(BatchOutcome::Ok(_)));
}

#[tokio::test]
async fn failed_status_check_reaches_the_completion_handle() {
    let app = spawn_app().await;
    mount_create_list(&app.marketing_server, "l1").await;
    mount_submit_batch(&app.marketing_server, "b1").await;
    Mock::given(path("/batches/b1"))
        .and(method("GET"))
        .respond_with(ResponseTemplate::new(404))
        .expect(1)
        .mount(&app.marketing_server)
        .await;

    let submission = app
        .orchestrator()
        .upload(
            spring_promo(),
            api_key(),
            UploadOptions {
                provisioning: Provisioning::Minimal,
                observe_completion: true,
            },
        )
        .await
        .unwrap();

    let outcome = submission.completion.unwrap().outcome().await.unwrap();
    assert_matches!(outcome, Err(PollError::Transport(e)) if e.call == RemoteCall::GetBatch);
}

#[tokio::test]
async fn never_finishing_batch_times_out() {
    let app = spawn_app().await;
    mount_create_list(&app.marketing_server, "l1").await;
    mount_submit_batch(&app.marketing_server, "b1").await;
    Mock::given(path("/batches/b1"))
        .and(method("GET"))
        .respond_with(
            ResponseTemplate::new(200).set_body_json(json!({ "id": "b1", "status": "pending" })),
        )
        .mount(&app.marketing_server)
        .await;

    let submission = app
        .orchestrator()
        .upload(
            spring_promo(),
            api_key(),
            UploadOptions {
                provisioning: Provisioning::Minimal,
                observe_completion: true,
            },
        )
        .await
        .unwrap();

    let outcome = submission.completion.unwrap().outcome().await.unwrap();
    assert_matches!(outcome, Err(PollError::Timeout { waited }) if waited > Duration::from_secs(1));
}

#[tokio::test]
async fn cancelled_polling_reports_nothing() {
    let app = spawn_app().await;
    mount_create_list(&app.marketing_server, "l1").await;
    mount_submit_batch(&app.marketing_server, "b1").await;
    Mock::given(path("/batches/b1"))
        .and(method("GET"))
        .respond_with(
            ResponseTemplate::new(200).set_body_json(json!({ "id": "b1", "status": "pending" })),
        )
        .mount(&app.marketing_server)
        .await;

    let submission = app
        .orchestrator()
        .upload(
            spring_promo(),
            api_key(),
            UploadOptions {
                provisioning: Provisioning::Minimal,
                observe_completion: true,
            },
        )
        .await
        .unwrap();

    let completion = submission.completion.unwrap();
    completion.cancel();
    assert_none!(completion.outcome().await);
}

#[tokio::test]
async fn concurrent_uploads_keep_their_own_keys() {
    let app = spawn_app().await;
    let server = &app.marketing_server;
    mount_no_provisioning(server).await;
    for (key, list_id, batch_id) in [("aaa-us1", "l1", "b1"), ("bbb-us2", "l2", "b2")] {
        // base64 of "anystring:<key>"
        let auth = match key {
            "aaa-us1" => "Basic YW55c3RyaW5nOmFhYS11czE=",
            _ => "Basic YW55c3RyaW5nOmJiYi11czI=",
        };
        Mock::given(path("/lists"))
            .and(wiremock::matchers::header("Authorization", auth))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "id": list_id })))
            .expect(1)
            .mount(server)
            .await;
        Mock::given(path("/batches"))
            .and(wiremock::matchers::header("Authorization", auth))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(json!({ "id": batch_id, "status": "pending" })),
            )
            .expect(1)
            .mount(server)
            .await;
    }

    let orchestrator = app.orchestrator();
    let upload = |key: &str| {
        orchestrator.upload(
            spring_promo(),
            ApiKey::parse(Secret::new(key.to_string())).unwrap(),
            UploadOptions::default(),
        )
    };
    let (a, b) = tokio::join!(upload("aaa-us1"), upload("bbb-us2"));
    assert_eq!(a.unwrap().accepted.batch.id, "b1");
    assert_eq!(b.unwrap().accepted.batch.id, "b2");
}
