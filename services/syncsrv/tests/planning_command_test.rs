//! Planning-driven downlink commands

#![allow(clippy::disallowed_methods)] // Integration test - unwrap is acceptable

mod common;

use chrono::{Duration, NaiveDate};
use crate::common::{device_twin, today, TestEnv, LORA_MODEL, STANDARD_MODEL};
use portal_model::{DaysOff, DeviceModelCommand, Layer, Planning, Schedule, TimeOfDay};
use portal_registry::DispatchedCommand;
use syncsrv::jobs::FailureKind;
use syncsrv::repository::devices::set_layer;
use syncsrv::repository::models::save_command;
use syncsrv::repository::planning::{save_layer, save_planning, save_schedule};
use syncsrv::{run_job, JobKind};

fn command(id: &str, model: &str) -> DeviceModelCommand {
    DeviceModelCommand {
        id: id.into(),
        device_model_id: model.into(),
        name: id.to_uppercase(),
        frame: "01FF".into(),
        port: 1,
        confirmed: false,
    }
}

fn planning(id: &str, start: NaiveDate, end: NaiveDate) -> Planning {
    Planning {
        id: id.into(),
        name: format!("Planning {}", id),
        start,
        end,
        day_off: DaysOff::empty(),
        command_id: None,
    }
}

fn schedule(id: &str, planning_id: &str, start: &str, end: &str, command_id: &str) -> Schedule {
    Schedule {
        id: id.into(),
        planning_id: planning_id.into(),
        start: TimeOfDay::parse(start).unwrap(),
        end: TimeOfDay::parse(end).unwrap(),
        command_id: command_id.into(),
    }
}

fn layer(id: &str, father: Option<&str>, planning: Option<&str>) -> Layer {
    Layer {
        id: id.into(),
        name: id.to_uppercase(),
        father: father.map(String::from),
        planning: planning.map(String::from),
    }
}

fn sent(device_id: &str, command_id: &str) -> DispatchedCommand {
    DispatchedCommand {
        device_id: device_id.into(),
        command_id: command_id.into(),
    }
}

/// lora-1 and lora-2 on layer `floor-1`, running planning `p1` from
/// yesterday to tomorrow with `open` due between 08:00 and 12:00
async fn planned_env() -> TestEnv {
    let env = TestEnv::create().await;
    env.registry.put_twin(device_twin("lora-1", 1, LORA_MODEL));
    env.registry.put_twin(device_twin("lora-2", 1, LORA_MODEL));
    run_job(JobKind::SyncDevices, &env.ctx).await.unwrap();

    let mut conn = env.pool().acquire().await.unwrap();
    save_command(&mut conn, &command("open", LORA_MODEL)).await.unwrap();
    save_command(&mut conn, &command("close", LORA_MODEL)).await.unwrap();
    save_planning(
        &mut conn,
        &planning("p1", today() - Duration::days(1), today() + Duration::days(1)),
    )
    .await
    .unwrap();
    save_schedule(&mut conn, &schedule("s1", "p1", "08:00", "12:00", "open"))
        .await
        .unwrap();
    save_schedule(&mut conn, &schedule("s2", "p1", "18:00", "22:00", "close"))
        .await
        .unwrap();
    save_layer(&mut conn, &layer("floor-1", None, Some("p1"))).await.unwrap();
    set_layer(&mut conn, "lora-1", Some("floor-1")).await.unwrap();
    set_layer(&mut conn, "lora-2", Some("floor-1")).await.unwrap();
    drop(conn);
    env
}

#[tokio::test]
async fn test_due_schedule_reaches_every_device_of_the_layer() {
    let env = planned_env().await;

    let report = run_job(JobKind::SendPlanningCommand, &env.ctx).await.unwrap();

    assert_eq!(report.remote_total, 2);
    assert_eq!(report.dispatched, 2);
    assert!(report.failures.is_empty());
    let mut dispatched = env.registry.dispatched();
    dispatched.sort_by(|a, b| a.device_id.cmp(&b.device_id));
    assert_eq!(dispatched, vec![sent("lora-1", "open"), sent("lora-2", "open")]);
}

#[tokio::test]
async fn test_child_layer_inherits_planning() {
    let env = planned_env().await;
    env.registry.put_twin(device_twin("lora-3", 1, LORA_MODEL));
    run_job(JobKind::SyncDevices, &env.ctx).await.unwrap();
    {
        let mut conn = env.pool().acquire().await.unwrap();
        save_layer(&mut conn, &layer("room-12", Some("floor-1"), None)).await.unwrap();
        set_layer(&mut conn, "lora-3", Some("room-12")).await.unwrap();
    }

    let report = run_job(JobKind::SendPlanningCommand, &env.ctx).await.unwrap();

    assert_eq!(report.dispatched, 3);
    assert!(env.registry.dispatched().contains(&sent("lora-3", "open")));
}

#[tokio::test]
async fn test_expired_planning_sends_nothing() {
    let env = planned_env().await;
    {
        let mut conn = env.pool().acquire().await.unwrap();
        save_planning(
            &mut conn,
            &planning("p1", today() - Duration::days(30), today() - Duration::days(1)),
        )
        .await
        .unwrap();
    }

    let report = run_job(JobKind::SendPlanningCommand, &env.ctx).await.unwrap();

    assert_eq!(report.dispatched, 0);
    assert!(env.registry.dispatched().is_empty());
}

#[tokio::test]
async fn test_day_off_sends_the_planning_command() {
    let env = planned_env().await;
    {
        let mut conn = env.pool().acquire().await.unwrap();
        let mut p1 = planning("p1", today() - Duration::days(1), today() + Duration::days(1));
        p1.day_off = DaysOff::WEDNESDAY;
        p1.command_id = Some("close".into());
        save_planning(&mut conn, &p1).await.unwrap();
    }

    run_job(JobKind::SendPlanningCommand, &env.ctx).await.unwrap();

    let commands: Vec<String> = env.registry.dispatched().into_iter().map(|c| c.command_id).collect();
    assert_eq!(commands, vec!["close".to_string(), "close".to_string()]);
}

#[tokio::test]
async fn test_device_without_layer_is_ignored() {
    let env = planned_env().await;
    env.registry.put_twin(device_twin("lora-9", 1, LORA_MODEL));
    run_job(JobKind::SyncDevices, &env.ctx).await.unwrap();

    let report = run_job(JobKind::SendPlanningCommand, &env.ctx).await.unwrap();

    assert_eq!(report.remote_total, 2);
    assert!(!env.registry.dispatched().iter().any(|c| c.device_id == "lora-9"));
}

#[tokio::test]
async fn test_dispatch_failure_is_isolated() {
    let env = planned_env().await;
    env.registry.fail_device("lora-1", "gateway offline");

    let report = run_job(JobKind::SendPlanningCommand, &env.ctx).await.unwrap();

    assert_eq!(report.dispatched, 1);
    assert_eq!(report.failed(), 1);
    assert_eq!(report.failures[0].id, "lora-1");
    assert_eq!(env.registry.dispatched(), vec![sent("lora-2", "open")]);
}

#[tokio::test]
async fn test_command_of_another_model_is_skipped() {
    let env = planned_env().await;
    env.registry.put_twin(device_twin("dev-1", 1, STANDARD_MODEL));
    run_job(JobKind::SyncDevices, &env.ctx).await.unwrap();
    {
        let mut conn = env.pool().acquire().await.unwrap();
        set_layer(&mut conn, "dev-1", Some("floor-1")).await.unwrap();
    }

    let report = run_job(JobKind::SendPlanningCommand, &env.ctx).await.unwrap();

    assert_eq!(report.dispatched, 2);
    assert_eq!(report.skipped(), 1);
    assert_eq!(report.failures[0].id, "dev-1");
    assert_eq!(report.failures[0].kind, FailureKind::Skipped);
}

#[tokio::test]
async fn test_unknown_command_fails_item() {
    let env = planned_env().await;
    {
        let mut conn = env.pool().acquire().await.unwrap();
        save_schedule(&mut conn, &schedule("s1", "p1", "08:00", "12:00", "vent"))
            .await
            .unwrap();
    }

    let report = run_job(JobKind::SendPlanningCommand, &env.ctx).await.unwrap();

    assert_eq!(report.dispatched, 0);
    assert_eq!(report.failed(), 2);
    assert!(report.failures.iter().all(|f| f.reason == "unknown command vent"));
}

#[tokio::test]
async fn test_missing_dispatcher_is_a_configuration_error() {
    let env = planned_env().await;
    let mut ctx = env.ctx.clone();
    ctx.dispatcher = None;

    let result = run_job(JobKind::SendPlanningCommand, &ctx).await;

    assert!(matches!(result, Err(errors::PortalError::Configuration(_))));
    assert!(env.registry.dispatched().is_empty());
}
