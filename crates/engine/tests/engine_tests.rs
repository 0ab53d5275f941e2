mod common;

use std::sync::Arc;

use serde_json::json;

use common::FakeGateway;
use orchestrator_core::models::{ExecutionContext, ExecutionStatus, WorkflowStep};
use orchestrator_core::OrchestratorError;
use orchestrator_engine::WorkflowEngine;

fn step(id: &str, agent: &str) -> WorkflowStep {
    WorkflowStep::new(id, agent)
}

fn engine_with(gateway: Arc<FakeGateway>) -> WorkflowEngine {
    WorkflowEngine::new(gateway)
}

#[tokio::test]
async fn validation_rejects_duplicate_step_ids() {
    let gateway = Arc::new(FakeGateway::new());
    let engine = engine_with(gateway);

    let valid = engine
        .create_workflow("ok", None, vec![step("a", "x"), step("b", "y")])
        .unwrap();
    assert!(WorkflowEngine::validate_workflow(&valid));

    let result = engine.create_workflow("dup", None, vec![step("a", "x"), step("a", "y")]);
    assert!(matches!(result, Err(OrchestratorError::Validation(_))));
}

#[tokio::test]
async fn validation_rejects_dangling_dependencies() {
    let gateway = Arc::new(FakeGateway::new());
    let engine = engine_with(gateway);

    let result = engine.create_workflow(
        "dangling",
        None,
        vec![step("a", "x"), step("b", "y").with_dependency("ghost")],
    );
    assert!(matches!(result, Err(OrchestratorError::Validation(_))));

    // 引用已有步骤的依赖合法
    let valid = engine
        .create_workflow(
            "ok",
            None,
            vec![step("a", "x"), step("b", "y").with_dependency("a")],
        )
        .unwrap();
    assert!(WorkflowEngine::validate_workflow(&valid));
}

#[tokio::test]
async fn executing_invalid_definition_fails_before_dispatch() {
    let gateway = Arc::new(FakeGateway::new());
    let engine = engine_with(gateway.clone());

    let mut definition = engine
        .create_workflow("ok", None, vec![step("a", "x")])
        .unwrap();
    definition.steps.push(step("a", "y"));

    let mut context = ExecutionContext::new("s-1");
    let result = engine.execute_workflow(&definition, &mut context).await;
    assert!(matches!(result, Err(OrchestratorError::Validation(_))));
    assert!(gateway.calls().is_empty());
}

/// 步骤2依赖步骤1，步骤1的智能体调用重试耗尽后失败：
/// 步骤1=失败，步骤2=unmet dependencies失败且不分发，
/// 步骤3按自身结果成功，整体partial。
#[tokio::test]
async fn failed_dependency_chain_yields_partial() {
    let gateway = Arc::new(FakeGateway::new());
    gateway.always_fail("extractor", 3);
    let engine = engine_with(gateway.clone());

    let definition = engine
        .create_workflow(
            "etl",
            Some("extract-transform-report".to_string()),
            vec![
                step("s1", "extractor"),
                step("s2", "transformer").with_dependency("s1"),
                step("s3", "reporter"),
            ],
        )
        .unwrap();

    let mut context = ExecutionContext::new("s-1");
    let result = engine
        .execute_workflow(&definition, &mut context)
        .await
        .unwrap();

    let s1 = &result.step_results["s1"];
    assert!(!s1.success);
    assert_eq!(s1.error.as_ref().unwrap().code, "timeout");
    assert_eq!(s1.attempts, 4);

    let s2 = &result.step_results["s2"];
    assert!(!s2.success);
    assert_eq!(s2.error.as_ref().unwrap().code, "unmet_dependencies");
    assert_eq!(s2.attempts, 0);

    assert!(result.step_results["s3"].success);
    assert_eq!(result.status, ExecutionStatus::Partial);

    // 步骤2没有产生分发
    assert_eq!(gateway.called_agents(), vec!["extractor", "reporter"]);
}

#[tokio::test]
async fn workflow_with_no_successful_step_is_a_failure() {
    let gateway = Arc::new(FakeGateway::new());
    gateway.always_fail("extractor", 0);
    let engine = engine_with(gateway);

    let definition = engine
        .create_workflow(
            "doomed",
            None,
            vec![
                step("s1", "extractor"),
                step("s2", "transformer").with_dependency("s1"),
            ],
        )
        .unwrap();

    let mut context = ExecutionContext::new("s-1");
    let result = engine
        .execute_workflow(&definition, &mut context)
        .await
        .unwrap();
    assert_eq!(result.status, ExecutionStatus::Failure);
}

#[tokio::test]
async fn steps_run_in_declaration_order_regardless_of_flags() {
    let gateway = Arc::new(FakeGateway::new());
    let engine = engine_with(gateway.clone());

    let mut parallel_step = step("s2", "b");
    parallel_step.parallel = true;
    parallel_step.priority = 99;

    let definition = engine
        .create_workflow("ordered", None, vec![step("s1", "a"), parallel_step, step("s3", "c")])
        .unwrap();

    let mut context = ExecutionContext::new("s-1");
    let result = engine
        .execute_workflow(&definition, &mut context)
        .await
        .unwrap();
    assert_eq!(result.status, ExecutionStatus::Success);

    // parallel与priority不改变声明顺序执行
    assert_eq!(gateway.called_agents(), vec!["a", "b", "c"]);
}

#[tokio::test]
async fn step_input_merges_shared_data_own_input_and_prior_results() {
    let gateway = Arc::new(FakeGateway::new());
    let engine = engine_with(gateway.clone());

    let definition = engine
        .create_workflow(
            "merge",
            None,
            vec![
                step("s1", "a"),
                step("s2", "b").with_input("mode", json!("fast")),
            ],
        )
        .unwrap();

    let mut context = ExecutionContext::new("session-42");
    context
        .shared_data
        .insert("locale".to_string(), json!("de"));

    engine
        .execute_workflow(&definition, &mut context)
        .await
        .unwrap();

    let calls = gateway.calls();
    assert_eq!(calls.len(), 2);
    assert_eq!(calls[1].path, "/execute");

    let body = calls[1].body.as_ref().unwrap();
    assert_eq!(body["session_id"], json!("session-42"));
    assert_eq!(body["locale"], json!("de"));
    assert_eq!(body["mode"], json!("fast"));
    // 前序步骤结果随输入传递
    assert_eq!(body["step_results"]["s1"]["success"], json!(true));
}

#[tokio::test]
async fn empty_workflow_reports_failure_status() {
    let gateway = Arc::new(FakeGateway::new());
    let engine = engine_with(gateway);

    let definition = engine.create_workflow("empty", None, vec![]).unwrap();
    let mut context = ExecutionContext::new("s-1");
    let result = engine
        .execute_workflow(&definition, &mut context)
        .await
        .unwrap();
    // 零个成功步骤按failure汇总
    assert_eq!(result.status, ExecutionStatus::Failure);
    assert!(result.step_results.is_empty());
}
