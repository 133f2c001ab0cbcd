mod common;

use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use axum::http::StatusCode;
use casedesk::alerts::{
    create_due_date_alerts, dispatch_pending_alerts, purge_old_alerts, refresh_urgency_flags,
    SendOutcome,
};
use casedesk::alerts::delivery::NO_RECIPIENT_ERROR;
use casedesk::jobs::{enqueue_alert_delivery, reserve_job, JOB_SEND_ALERT_EMAIL};
use casedesk::models::{Alert, Case, Job, NewAlert};
use casedesk::schema::{alerts, cases, jobs};
use casedesk::{default_handlers, Worker};
use chrono::{Duration as ChronoDuration, NaiveDateTime, SubsecRound, Utc};
use common::{acquire_db_lock, read_json, TestApp};
use diesel::prelude::*;
use serde_json::{json, Value};
use uuid::Uuid;

/// Current time at the precision Postgres stores.
fn db_now() -> NaiveDateTime {
    Utc::now().naive_utc().trunc_subsecs(6)
}

struct AlertSeed {
    fire_at: NaiveDateTime,
    send_email: bool,
    recipient: Option<&'static str>,
    sent_at: Option<NaiveDateTime>,
}

impl AlertSeed {
    fn due(fire_at: NaiveDateTime) -> Self {
        Self {
            fire_at,
            send_email: true,
            recipient: None,
            sent_at: None,
        }
    }
}

async fn seed_alert(app: &TestApp, case: &Case, seed: AlertSeed) -> Result<Alert> {
    let case_id = case.id;
    let created_by = case.responsible_id;
    app.with_conn(move |conn| {
        let alert: Alert = diesel::insert_into(alerts::table)
            .values(&NewAlert {
                id: Uuid::new_v4(),
                case_id,
                alert_type: "VENCIMIENTO".to_string(),
                message: "El caso vence pronto".to_string(),
                fire_at: seed.fire_at,
                send_email: seed.send_email,
                recipient_email: seed.recipient.map(str::to_string),
                created_by,
                created_at: seed.fire_at,
            })
            .get_result(conn)?;
        if let Some(sent_at) = seed.sent_at {
            return Ok(diesel::update(alerts::table.find(alert.id))
                .set((alerts::sent.eq(true), alerts::sent_at.eq(Some(sent_at))))
                .get_result(conn)?);
        }
        Ok(alert)
    })
    .await
}

async fn reload_alert(app: &TestApp, alert_id: Uuid) -> Result<Alert> {
    app.with_conn(move |conn| Ok(alerts::table.find(alert_id).first(conn)?))
        .await
}

async fn delivery_jobs_for(app: &TestApp, alert_id: Uuid) -> Result<Vec<Job>> {
    app.with_conn(move |conn| {
        Ok(jobs::table
            .filter(jobs::payload.eq(json!({ "alert_id": alert_id })))
            .load(conn)?)
    })
    .await
}

#[tokio::test]
async fn daily_scan_targets_cases_due_in_seven_days_once() -> Result<()> {
    let _lock = acquire_db_lock().await;
    let Some(app) = TestApp::try_new().await? else {
        return Ok(());
    };

    let owner = app
        .insert_user("ana", "clave", "user", Some("ana@estudio.cl"))
        .await?;
    let today = Utc::now().date_naive();
    let target = app
        .insert_case("P-100-2024", owner, today + ChronoDuration::days(7))
        .await?;
    let earlier = app
        .insert_case("P-101-2024", owner, today + ChronoDuration::days(6))
        .await?;

    let settings = app.settings();
    let now = db_now();
    let scan_settings = settings.clone();
    let first = app
        .with_conn(move |conn| Ok(create_due_date_alerts(conn, &scan_settings, now)?))
        .await?;
    assert_eq!(first.created, 1);
    assert!(first.failures.is_empty());

    let scan_settings = settings.clone();
    let second = app
        .with_conn(move |conn| {
            Ok(create_due_date_alerts(
                conn,
                &scan_settings,
                now + ChronoDuration::hours(1),
            )?)
        })
        .await?;
    assert_eq!(second.created, 0);
    assert_eq!(second.skipped, 1);

    let created = app.alerts_for_case(target.id).await?;
    assert_eq!(created.len(), 1);
    let alert = &created[0];
    assert_eq!(alert.alert_type, "VENCIMIENTO");
    assert_eq!(alert.recipient_email.as_deref(), Some("ana@estudio.cl"));
    assert_eq!(alert.fire_at, now + ChronoDuration::minutes(30));
    assert!(alert.message.starts_with("El caso P-100-2024 vence en 7 días"));
    assert!(app.alerts_for_case(earlier.id).await?.is_empty());

    app.cleanup().await?;
    Ok(())
}

#[tokio::test]
async fn dispatch_claims_only_due_pending_email_alerts() -> Result<()> {
    let _lock = acquire_db_lock().await;
    let Some(app) = TestApp::try_new().await? else {
        return Ok(());
    };

    let owner = app
        .insert_user("ana", "clave", "user", Some("ana@estudio.cl"))
        .await?;
    let today = Utc::now().date_naive();
    let case = app
        .insert_case("P-200-2024", owner, today + ChronoDuration::days(3))
        .await?;
    let now = db_now();

    let due = seed_alert(&app, &case, AlertSeed::due(now - ChronoDuration::minutes(5))).await?;
    seed_alert(&app, &case, AlertSeed::due(now + ChronoDuration::hours(2))).await?;
    seed_alert(
        &app,
        &case,
        AlertSeed {
            send_email: false,
            ..AlertSeed::due(now - ChronoDuration::hours(1))
        },
    )
    .await?;
    seed_alert(
        &app,
        &case,
        AlertSeed {
            sent_at: Some(now - ChronoDuration::hours(1)),
            ..AlertSeed::due(now - ChronoDuration::hours(2))
        },
    )
    .await?;

    let report = app
        .with_conn(move |conn| Ok(dispatch_pending_alerts(conn, now)?))
        .await?;
    assert_eq!(report.enqueued, 1);

    let queued: Vec<Job> = app
        .with_conn(|conn| {
            Ok(jobs::table
                .filter(jobs::job_type.eq(JOB_SEND_ALERT_EMAIL))
                .load(conn)?)
        })
        .await?;
    assert_eq!(queued.len(), 1);
    assert_eq!(queued[0].payload, json!({ "alert_id": due.id }));
    assert_eq!(reload_alert(&app, due.id).await?.dispatched_at, Some(now));

    let again = app
        .with_conn(move |conn| Ok(dispatch_pending_alerts(conn, now + ChronoDuration::hours(1))?))
        .await?;
    assert_eq!(again.enqueued, 0);

    app.cleanup().await?;
    Ok(())
}

#[tokio::test]
async fn worker_delivers_dispatched_alerts() -> Result<()> {
    let _lock = acquire_db_lock().await;
    let Some(app) = TestApp::try_new().await? else {
        return Ok(());
    };

    let owner = app
        .insert_user("ana", "clave", "user", Some("ana@estudio.cl"))
        .await?;
    let case = app
        .insert_case(
            "P-250-2024",
            owner,
            Utc::now().date_naive() + ChronoDuration::days(4),
        )
        .await?;
    let now = db_now();
    let alert = seed_alert(&app, &case, AlertSeed::due(now - ChronoDuration::minutes(1))).await?;
    app.with_conn(move |conn| Ok(dispatch_pending_alerts(conn, now)?))
        .await?;

    let worker = Worker::new(
        Arc::new(app.notifier()),
        default_handlers(),
        Duration::from_millis(10),
    );
    assert!(worker.tick().await?);
    assert!(!worker.tick().await?);

    assert_eq!(app.mailer().sent().await.len(), 1);
    assert!(reload_alert(&app, alert.id).await?.sent);
    let statuses: Vec<String> = app
        .with_conn(|conn| Ok(jobs::table.select(jobs::status).load(conn)?))
        .await?;
    assert_eq!(statuses, ["succeeded"]);

    app.cleanup().await?;
    Ok(())
}

#[tokio::test]
async fn scan_picks_up_cases_as_the_calendar_rolls_forward() -> Result<()> {
    let _lock = acquire_db_lock().await;
    let Some(app) = TestApp::try_new().await? else {
        return Ok(());
    };

    let owner = app
        .insert_user("ana", "clave", "user", Some("ana@estudio.cl"))
        .await?;
    let now = db_now();
    let case = app
        .insert_case("P-150-2024", owner, now.date() + ChronoDuration::days(10))
        .await?;

    let settings = app.settings();
    let today = app
        .with_conn(move |conn| Ok(create_due_date_alerts(conn, &settings, now)?))
        .await?;
    assert_eq!(today.created, 0);
    assert!(app.alerts_for_case(case.id).await?.is_empty());

    let later = now + ChronoDuration::days(3);
    let settings = app.settings();
    let rolled = app
        .with_conn(move |conn| Ok(create_due_date_alerts(conn, &settings, later)?))
        .await?;
    assert_eq!(rolled.created, 1);

    let created = app.alerts_for_case(case.id).await?;
    assert_eq!(created.len(), 1);
    assert_eq!(created[0].fire_at, later + ChronoDuration::minutes(30));

    app.cleanup().await?;
    Ok(())
}

#[tokio::test]
async fn fixing_a_recipient_mid_retry_keeps_one_delivery_in_flight() -> Result<()> {
    let _lock = acquire_db_lock().await;
    let Some(app) = TestApp::try_new().await? else {
        return Ok(());
    };

    let owner = app
        .insert_user("ana", "clave", "user", Some("ana@estudio.cl"))
        .await?;
    let case = app
        .insert_case(
            "P-260-2024",
            owner,
            Utc::now().date_naive() + ChronoDuration::days(4),
        )
        .await?;
    let now = db_now();
    let alert = seed_alert(&app, &case, AlertSeed::due(now - ChronoDuration::minutes(1))).await?;
    app.with_conn(move |conn| Ok(dispatch_pending_alerts(conn, now)?))
        .await?;

    let worker = Worker::new(
        Arc::new(app.notifier()),
        default_handlers(),
        Duration::from_millis(10),
    );
    app.mailer().set_failing(true);
    assert!(worker.tick().await?);
    let queued = delivery_jobs_for(&app, alert.id).await?;
    assert_eq!(queued.len(), 1);
    assert_eq!(queued[0].status, "queued");

    let token = app.login_token("ana", "clave").await?;
    let response = app
        .patch_json(
            &format!("/api/alerts/{}", alert.id),
            &json!({ "recipient_email": "otro@estudio.cl" }),
            Some(&token),
        )
        .await?;
    assert_eq!(response.status(), StatusCode::OK);
    let stored = reload_alert(&app, alert.id).await?;
    assert!(stored.dispatched_at.is_some());
    assert!(stored.last_error.is_none());

    let again = app
        .with_conn(|conn| Ok(dispatch_pending_alerts(conn, db_now())?))
        .await?;
    assert_eq!(again.enqueued, 0);
    assert_eq!(delivery_jobs_for(&app, alert.id).await?.len(), 1);

    app.mailer().set_failing(false);
    app.with_conn(|conn| {
        diesel::update(jobs::table)
            .set(jobs::run_after.eq(db_now() - ChronoDuration::minutes(1)))
            .execute(conn)?;
        Ok(())
    })
    .await?;
    assert!(worker.tick().await?);
    assert!(!worker.tick().await?);

    let sent = app.mailer().sent().await;
    assert_eq!(sent.len(), 1);
    assert_eq!(sent[0].to, "otro@estudio.cl");
    assert!(reload_alert(&app, alert.id).await?.sent);

    let response = app
        .post_empty(&format!("/api/alerts/{}/resend", alert.id), Some(&token))
        .await?;
    assert_eq!(response.status(), StatusCode::OK);
    assert!(reload_alert(&app, alert.id).await?.dispatched_at.is_none());
    let resent = app
        .with_conn(|conn| Ok(dispatch_pending_alerts(conn, db_now())?))
        .await?;
    assert_eq!(resent.enqueued, 1);

    app.cleanup().await?;
    Ok(())
}

#[tokio::test]
async fn alerts_switched_off_after_dispatch_are_not_mailed() -> Result<()> {
    let _lock = acquire_db_lock().await;
    let Some(app) = TestApp::try_new().await? else {
        return Ok(());
    };

    let owner = app
        .insert_user("ana", "clave", "user", Some("ana@estudio.cl"))
        .await?;
    let case = app
        .insert_case(
            "P-270-2024",
            owner,
            Utc::now().date_naive() + ChronoDuration::days(4),
        )
        .await?;
    let now = db_now();
    let alert = seed_alert(&app, &case, AlertSeed::due(now - ChronoDuration::minutes(1))).await?;
    app.with_conn(move |conn| Ok(dispatch_pending_alerts(conn, now)?))
        .await?;

    let token = app.login_token("ana", "clave").await?;
    let response = app
        .patch_json(
            &format!("/api/alerts/{}", alert.id),
            &json!({ "send_email": false }),
            Some(&token),
        )
        .await?;
    assert_eq!(response.status(), StatusCode::OK);

    let worker = Worker::new(
        Arc::new(app.notifier()),
        default_handlers(),
        Duration::from_millis(10),
    );
    assert!(worker.tick().await?);
    assert!(app.mailer().sent().await.is_empty());
    assert!(!reload_alert(&app, alert.id).await?.sent);
    let finished = delivery_jobs_for(&app, alert.id).await?;
    assert_eq!(finished.len(), 1);
    assert_eq!(finished[0].status, "succeeded");

    app.cleanup().await?;
    Ok(())
}

#[tokio::test]
async fn jobs_abandoned_mid_run_are_reserved_again() -> Result<()> {
    let _lock = acquire_db_lock().await;
    let Some(app) = TestApp::try_new().await? else {
        return Ok(());
    };

    let now = db_now();
    let (abandoned, running) = app
        .with_conn(move |conn| {
            let abandoned = enqueue_alert_delivery(conn, Uuid::new_v4(), now)?;
            let running = enqueue_alert_delivery(conn, Uuid::new_v4(), now)?;
            diesel::update(jobs::table.find(abandoned.id))
                .set((
                    jobs::status.eq("processing"),
                    jobs::attempts.eq(1),
                    jobs::updated_at.eq(now - ChronoDuration::hours(1)),
                ))
                .execute(conn)?;
            diesel::update(jobs::table.find(running.id))
                .set((
                    jobs::status.eq("processing"),
                    jobs::attempts.eq(1),
                    jobs::updated_at.eq(now - ChronoDuration::minutes(1)),
                ))
                .execute(conn)?;
            Ok((abandoned, running))
        })
        .await?;

    let reserved = app
        .with_conn(move |conn| Ok(reserve_job(conn, &[JOB_SEND_ALERT_EMAIL], now)?))
        .await?
        .expect("abandoned job should be reserved");
    assert_eq!(reserved.id, abandoned.id);
    assert_eq!(reserved.attempts, 2);
    assert_eq!(reserved.updated_at, now);

    let next = app
        .with_conn(move |conn| Ok(reserve_job(conn, &[JOB_SEND_ALERT_EMAIL], now)?))
        .await?;
    assert!(next.is_none(), "job {} is still running", running.id);

    app.cleanup().await?;
    Ok(())
}

#[tokio::test]
async fn an_alert_is_marked_sent_at_most_once() -> Result<()> {
    let _lock = acquire_db_lock().await;
    let Some(app) = TestApp::try_new().await? else {
        return Ok(());
    };

    let owner = app
        .insert_user("ana", "clave", "user", Some("ana@estudio.cl"))
        .await?;
    let case = app
        .insert_case(
            "P-300-2024",
            owner,
            Utc::now().date_naive() + ChronoDuration::days(2),
        )
        .await?;
    let now = db_now();
    let notifier = app.notifier();
    let alert = seed_alert(&app, &case, AlertSeed::due(now)).await?;

    let first = notifier.send_alert(alert.id, 1, now).await;
    assert_eq!(
        first,
        SendOutcome::Sent {
            recipient: "ana@estudio.cl".to_string()
        }
    );
    let second = notifier.send_alert(alert.id, 1, now).await;
    assert_eq!(second, SendOutcome::AlreadySent);

    let sent = app.mailer().sent().await;
    assert_eq!(sent.len(), 1);
    assert_eq!(sent[0].subject, "Alerta: Vencimiento de Plazo - P-300-2024");
    assert!(sent[0]
        .html
        .contains(&format!("https://casedesk.test/cases/{}", case.id)));

    let stored = reload_alert(&app, alert.id).await?;
    assert!(stored.sent);
    assert_eq!(stored.sent_at, Some(now));

    app.cleanup().await?;
    Ok(())
}

#[tokio::test]
async fn delivery_gives_up_after_four_attempts() -> Result<()> {
    let _lock = acquire_db_lock().await;
    let Some(app) = TestApp::try_new().await? else {
        return Ok(());
    };

    let owner = app.insert_user("ana", "clave", "user", None).await?;
    let case = app
        .insert_case(
            "P-400-2024",
            owner,
            Utc::now().date_naive() + ChronoDuration::days(2),
        )
        .await?;
    let now = db_now();
    let notifier = app.notifier();
    let alert = seed_alert(
        &app,
        &case,
        AlertSeed {
            recipient: Some("fiscalia@estado.cl"),
            ..AlertSeed::due(now)
        },
    )
    .await?;
    app.with_conn(move |conn| Ok(dispatch_pending_alerts(conn, now)?))
        .await?;
    app.mailer().set_failing(true);

    for attempt in 1..=3 {
        match notifier.send_alert(alert.id, attempt, now).await {
            SendOutcome::Failed {
                retry_in: Some(_), ..
            } => {}
            other => panic!("attempt {attempt} should be retried, got {other:?}"),
        }
        assert!(reload_alert(&app, alert.id).await?.dispatched_at.is_some());
    }

    match notifier.send_alert(alert.id, 4, now).await {
        SendOutcome::Failed { retry_in: None, .. } => {}
        other => panic!("fourth attempt should be final, got {other:?}"),
    }

    let stored = reload_alert(&app, alert.id).await?;
    assert!(!stored.sent);
    assert!(stored.dispatched_at.is_none());
    assert!(stored
        .last_error
        .as_deref()
        .is_some_and(|error| error.contains("relay unavailable")));
    assert!(app.mailer().sent().await.is_empty());

    app.cleanup().await?;
    Ok(())
}

#[tokio::test]
async fn alerts_without_recipient_stay_pending() -> Result<()> {
    let _lock = acquire_db_lock().await;
    let Some(app) = TestApp::try_new().await? else {
        return Ok(());
    };

    let owner = app.insert_user("ana", "clave", "user", None).await?;
    let case = app
        .insert_case(
            "P-500-2024",
            owner,
            Utc::now().date_naive() + ChronoDuration::days(2),
        )
        .await?;
    let now = db_now();
    let notifier = app.notifier();
    let alert = seed_alert(&app, &case, AlertSeed::due(now)).await?;

    assert_eq!(
        notifier.send_alert(alert.id, 1, now).await,
        SendOutcome::NoRecipient
    );
    let stored = reload_alert(&app, alert.id).await?;
    assert!(!stored.sent);
    assert_eq!(stored.last_error.as_deref(), Some(NO_RECIPIENT_ERROR));

    app.cleanup().await?;
    Ok(())
}

#[tokio::test]
async fn purge_removes_only_old_sent_alerts() -> Result<()> {
    let _lock = acquire_db_lock().await;
    let Some(app) = TestApp::try_new().await? else {
        return Ok(());
    };

    let owner = app.insert_user("ana", "clave", "user", None).await?;
    let case = app
        .insert_case(
            "P-600-2024",
            owner,
            Utc::now().date_naive() + ChronoDuration::days(20),
        )
        .await?;
    let now = db_now();
    let old_sent = seed_alert(
        &app,
        &case,
        AlertSeed {
            sent_at: Some(now - ChronoDuration::days(120)),
            ..AlertSeed::due(now - ChronoDuration::days(121))
        },
    )
    .await?;
    let recent_sent = seed_alert(
        &app,
        &case,
        AlertSeed {
            sent_at: Some(now - ChronoDuration::days(10)),
            ..AlertSeed::due(now - ChronoDuration::days(11))
        },
    )
    .await?;
    let old_pending =
        seed_alert(&app, &case, AlertSeed::due(now - ChronoDuration::days(200))).await?;

    let removed = app
        .with_conn(move |conn| Ok(purge_old_alerts(conn, 90, now)?))
        .await?;
    assert_eq!(removed, 1);

    let remaining: Vec<Uuid> = app
        .alerts_for_case(case.id)
        .await?
        .into_iter()
        .map(|alert| alert.id)
        .collect();
    assert!(!remaining.contains(&old_sent.id));
    assert!(remaining.contains(&recent_sent.id));
    assert!(remaining.contains(&old_pending.id));

    app.cleanup().await?;
    Ok(())
}

#[tokio::test]
async fn urgency_flags_follow_the_calendar() -> Result<()> {
    let _lock = acquire_db_lock().await;
    let Some(app) = TestApp::try_new().await? else {
        return Ok(());
    };

    let owner = app.insert_user("ana", "clave", "user", None).await?;
    let today = Utc::now().date_naive();
    let soon = app
        .insert_case("P-700-2024", owner, today + ChronoDuration::days(7))
        .await?;
    let later = app
        .insert_case("P-701-2024", owner, today + ChronoDuration::days(8))
        .await?;
    let later_id = later.id;
    app.with_conn(move |conn| {
        diesel::update(cases::table.find(later_id))
            .set(cases::urgent.eq(true))
            .execute(conn)?;
        Ok(())
    })
    .await?;

    let changed = app
        .with_conn(move |conn| Ok(refresh_urgency_flags(conn, today)?))
        .await?;
    assert_eq!(changed, 2);

    let flags: Vec<(Uuid, bool)> = app
        .with_conn(|conn| Ok(cases::table.select((cases::id, cases::urgent)).load(conn)?))
        .await?;
    assert!(flags.contains(&(soon.id, true)));
    assert!(flags.contains(&(later.id, false)));

    app.cleanup().await?;
    Ok(())
}

#[tokio::test]
async fn alerts_of_foreign_cases_cannot_be_touched() -> Result<()> {
    let _lock = acquire_db_lock().await;
    let Some(app) = TestApp::try_new().await? else {
        return Ok(());
    };

    let owner = app.insert_user("ana", "clave", "user", None).await?;
    app.insert_user("bruno", "clave", "user", None).await?;
    app.insert_user("carla", "clave", "staff", None).await?;
    let case = app
        .insert_case(
            "P-800-2024",
            owner,
            Utc::now().date_naive() + ChronoDuration::days(4),
        )
        .await?;
    let alert = seed_alert(&app, &case, AlertSeed::due(db_now())).await?;

    let outsider = app.login_token("bruno", "clave").await?;
    let response = app
        .post_empty(&format!("/api/alerts/{}/read", alert.id), Some(&outsider))
        .await?;
    assert_eq!(response.status(), StatusCode::FORBIDDEN);
    assert!(!reload_alert(&app, alert.id).await?.read);

    let response = app
        .get(&format!("/api/cases/{}", case.id), Some(&outsider))
        .await?;
    assert_eq!(response.status(), StatusCode::NOT_FOUND);

    let listed: Value = read_json(app.get("/api/alerts", Some(&outsider)).await?).await?;
    assert_eq!(listed["total"], 0);

    let staff = app.login_token("carla", "clave").await?;
    let response = app
        .post_empty(&format!("/api/alerts/{}/read", alert.id), Some(&staff))
        .await?;
    assert_eq!(response.status(), StatusCode::OK);
    let body: Value = read_json(response).await?;
    assert_eq!(body["read"], true);

    app.cleanup().await?;
    Ok(())
}

#[tokio::test]
async fn manual_alerts_resend_and_bulk_mark_sent() -> Result<()> {
    let _lock = acquire_db_lock().await;
    let Some(app) = TestApp::try_new().await? else {
        return Ok(());
    };

    let owner = app
        .insert_user("ana", "clave", "user", Some("ana@estudio.cl"))
        .await?;
    app.insert_user("carla", "clave", "staff", None).await?;
    let case = app
        .insert_case(
            "P-900-2024",
            owner,
            Utc::now().date_naive() + ChronoDuration::days(15),
        )
        .await?;
    let token = app.login_token("ana", "clave").await?;

    let past = app
        .post_json(
            "/api/alerts",
            &json!({
                "case_id": case.id,
                "alert_type": "AUDIENCIA",
                "message": "Audiencia de alegatos",
                "fire_at": (Utc::now() - ChronoDuration::hours(1)).to_rfc3339(),
            }),
            Some(&token),
        )
        .await?;
    assert_eq!(past.status(), StatusCode::UNPROCESSABLE_ENTITY);
    let error: Value = read_json(past).await?;
    assert_eq!(error["field"], "fire_at");

    let created = app
        .post_json(
            "/api/alerts",
            &json!({
                "case_id": case.id,
                "alert_type": "AUDIENCIA",
                "message": "Audiencia de alegatos",
                "fire_at": (Utc::now() + ChronoDuration::days(1)).to_rfc3339(),
            }),
            Some(&token),
        )
        .await?;
    assert_eq!(created.status(), StatusCode::CREATED);
    let alert: Value = read_json(created).await?;
    assert_eq!(alert["alert_type_label"], "Audiencia Programada");
    assert_eq!(alert["recipient_email"], "ana@estudio.cl");
    assert_eq!(alert["send_email"], true);
    let alert_id = alert["id"].as_str().unwrap_or_default().to_string();

    let forbidden = app
        .post_json(
            "/api/alerts/bulk/mark-sent",
            &json!({ "ids": [alert_id] }),
            Some(&token),
        )
        .await?;
    assert_eq!(forbidden.status(), StatusCode::FORBIDDEN);

    let staff = app.login_token("carla", "clave").await?;
    let marked: Value = read_json(
        app.post_json(
            "/api/alerts/bulk/mark-sent",
            &json!({ "ids": [alert_id] }),
            Some(&staff),
        )
        .await?,
    )
    .await?;
    assert_eq!(marked["updated"], 1);

    let resent: Value = read_json(
        app.post_empty(&format!("/api/alerts/{alert_id}/resend"), Some(&token))
            .await?,
    )
    .await?;
    assert_eq!(resent["sent"], false);
    assert_eq!(resent["sent_at"], Value::Null);

    let updated: Value = read_json(
        app.patch_json(
            &format!("/api/alerts/{alert_id}"),
            &json!({ "recipient_email": "otro@estudio.cl", "send_email": false }),
            Some(&token),
        )
        .await?,
    )
    .await?;
    assert_eq!(updated["recipient_email"], "otro@estudio.cl");
    assert_eq!(updated["send_email"], false);

    app.cleanup().await?;
    Ok(())
}
