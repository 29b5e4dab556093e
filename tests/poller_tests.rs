//! End-to-end poll cycles against an in-memory vCenter.

mod common;

use common::*;
use std::sync::atomic::Ordering;
use vcenter_exporter::vsphere::{Counter, PowerState};

const CPU: &str = "vcenter_cpu_usagemhz_average";
const DEMO_ANNOTATION: &str = "name:demo\nprojectid:proj1";

fn demo_labels() -> Vec<(&'static str, &'static str)> {
    vec![
        ("vm_name", "demo"),
        ("project_id", "proj1"),
        ("vcenter_name", VCENTER),
        ("vcenter_node", "node01"),
        ("instance_uuid", "uuid-vm-demo"),
        ("metric_detail", "none"),
    ]
}

fn single_vm_api() -> std::sync::Arc<FakeApi> {
    let api = FakeApi::new();
    api.add_counter(6, "cpu", "usagemhz", "average");
    api.add_host("host-1", "node01");
    api.add_vm(
        "vm-1",
        vm("vm-demo", PowerState::PoweredOn, Some(DEMO_ANNOTATION), Some("host-1")),
    );
    api
}

#[tokio::test]
async fn test_sample_sets_gauge_with_all_labels() {
    let api = single_vm_api();
    api.set_perf("vm-1", vec![series(6, "", 42)]);
    let mut h = start(api, Some(vec!["cpu.usagemhz.average".into()])).await;

    let report = h.poller.poll_once().await.unwrap();
    assert_eq!(report.eligible, 1);
    assert_eq!(report.sampled, 1);
    assert_eq!(report.samples.set, 1);
    assert_eq!(sample_value(&h.registry, CPU, &demo_labels()), Some(42.0));

    let specs = h.api.perf_queries.lock().unwrap().clone();
    assert_eq!(specs.len(), 1);
    assert_eq!(specs[0].max_sample, 1);
    assert_eq!(specs[0].interval_id, 20);
    assert_eq!(specs[0].metric_ids[0].instance, "*");
}

#[tokio::test]
async fn test_sub_instance_becomes_metric_detail() {
    let api = single_vm_api();
    api.set_perf("vm-1", vec![series(6, "", 10), series(6, "0", 4)]);
    let mut h = start(api, None).await;

    h.poller.poll_once().await.unwrap();

    let mut labels = demo_labels();
    labels.retain(|(k, _)| *k != "metric_detail");
    labels.push(("metric_detail", "0"));
    assert_eq!(sample_value(&h.registry, CPU, &labels), Some(4.0));
    assert_eq!(sample_value(&h.registry, CPU, &demo_labels()), Some(10.0));
}

#[tokio::test]
async fn test_no_data_sentinel_keeps_previous_value() {
    let api = single_vm_api();
    api.set_perf("vm-1", vec![series(6, "", 42)]);
    let mut h = start(api, None).await;
    h.poller.poll_once().await.unwrap();

    h.api.set_perf("vm-1", vec![series(6, "", -1)]);
    let report = h.poller.poll_once().await.unwrap();

    assert_eq!(report.samples.set, 0);
    assert_eq!(report.samples.suppressed, 1);
    assert_eq!(sample_value(&h.registry, CPU, &demo_labels()), Some(42.0));
    assert_eq!(h.health.suppressed_samples.load(Ordering::Relaxed), 1);
}

#[tokio::test]
async fn test_unmanaged_annotation_is_never_queried() {
    let api = FakeApi::new();
    api.add_counter(6, "cpu", "usagemhz", "average");
    api.add_vm("vm-1", vm("other", PowerState::PoweredOn, Some("foo:bar"), None));
    api.add_vm("vm-2", vm("bare", PowerState::PoweredOn, None, None));
    // marker must match at the start of the text
    api.add_vm(
        "vm-3",
        vm("late", PowerState::PoweredOn, Some("owner:x\nname:late\nprojectid:p"), None),
    );
    let mut h = start(api, None).await;

    let report = h.poller.poll_once().await.unwrap();
    assert_eq!(report.inventory.listed, 3);
    assert_eq!(report.inventory.unmanaged, 3);
    assert_eq!(report.eligible, 0);
    assert_eq!(h.api.perf_query_count(), 0);
}

#[tokio::test]
async fn test_powered_off_vm_is_not_queried() {
    let api = FakeApi::new();
    api.add_counter(6, "cpu", "usagemhz", "average");
    api.add_vm("vm-1", vm("off", PowerState::PoweredOff, Some(DEMO_ANNOTATION), None));
    api.add_vm("vm-2", vm("susp", PowerState::Suspended, Some(DEMO_ANNOTATION), None));
    let mut h = start(api, None).await;

    let report = h.poller.poll_once().await.unwrap();
    assert_eq!(report.inventory.not_running, 2);
    assert_eq!(h.api.perf_query_count(), 0);
}

#[tokio::test]
async fn test_missing_required_key_rejects_vm() {
    let api = FakeApi::new();
    api.add_counter(6, "cpu", "usagemhz", "average");
    api.add_vm("vm-1", vm("noproj", PowerState::PoweredOn, Some("name:x"), None));
    let mut h = start(api, None).await;

    let report = h.poller.poll_once().await.unwrap();
    assert_eq!(report.rejected_annotations, 1);
    assert_eq!(report.eligible, 0);
    assert_eq!(h.api.perf_query_count(), 0);
    assert_eq!(h.health.rejected_annotations.load(Ordering::Relaxed), 1);
}

#[tokio::test]
async fn test_vm_vanishing_during_sampling_does_not_stop_cycle() {
    let api = FakeApi::new();
    api.add_counter(6, "cpu", "usagemhz", "average");
    api.add_vm("vm-1", vm("gone", PowerState::PoweredOn, Some("name:gone\nprojectid:p"), None));
    api.add_vm("vm-2", vm("stays", PowerState::PoweredOn, Some("name:stays\nprojectid:p"), None));
    api.vanish_perf("vm-1");
    api.set_perf("vm-2", vec![series(6, "", 7)]);
    let mut h = start(api, None).await;

    let report = h.poller.poll_once().await.unwrap();
    assert_eq!(report.vanished, 1);
    assert_eq!(report.sampled, 1);
    assert_eq!(h.api.queried_vms(), vec!["vm-1", "vm-2"]);
    assert_eq!(
        sample_value(&h.registry, CPU, &[("vm_name", "stays")]),
        Some(7.0)
    );
}

#[tokio::test]
async fn test_empty_stats_result_is_contained_to_one_vm() {
    let api = FakeApi::new();
    api.add_counter(6, "cpu", "usagemhz", "average");
    api.add_vm("vm-1", vm("blank", PowerState::PoweredOn, Some("name:blank\nprojectid:p"), None));
    api.add_vm("vm-2", vm("stays", PowerState::PoweredOn, Some("name:stays\nprojectid:p"), None));
    api.empty_perf_result("vm-1");
    api.set_perf("vm-2", vec![series(6, "", 11)]);
    let mut h = start(api, None).await;

    let report = h.poller.poll_once().await.unwrap();
    assert_eq!(report.failed, 1);
    assert_eq!(report.sampled, 1);
    assert_eq!(report.samples.set, 1);
    assert_eq!(h.api.queried_vms(), vec!["vm-1", "vm-2"]);
    assert_eq!(h.health.sample_failures.load(Ordering::Relaxed), 1);
    assert_eq!(
        sample_value(&h.registry, CPU, &[("vm_name", "stays")]),
        Some(11.0)
    );
    assert_eq!(sample_value(&h.registry, CPU, &[("vm_name", "blank")]), None);
}

#[tokio::test]
async fn test_summary_fault_is_counted_and_skipped() {
    let api = FakeApi::new();
    api.add_counter(6, "cpu", "usagemhz", "average");
    api.add_vm("vm-1", vm("broken", PowerState::PoweredOn, Some("name:broken\nprojectid:p"), None));
    api.add_vm("vm-2", vm("stays", PowerState::PoweredOn, Some("name:stays\nprojectid:p"), None));
    api.break_summary("vm-1");
    api.set_perf("vm-2", vec![series(6, "", 5)]);
    let mut h = start(api, None).await;

    let report = h.poller.poll_once().await.unwrap();
    assert_eq!(report.inventory.failed, 1);
    assert_eq!(report.sampled, 1);
    assert_eq!(h.api.queried_vms(), vec!["vm-2"]);
    assert_eq!(h.health.summary_failures.load(Ordering::Relaxed), 1);
}

#[tokio::test]
async fn test_vm_vanishing_before_summary_is_skipped() {
    let api = FakeApi::new();
    api.add_counter(6, "cpu", "usagemhz", "average");
    api.add_vm("vm-1", vm("gone", PowerState::PoweredOn, Some("name:gone\nprojectid:p"), None));
    api.add_vm("vm-2", vm("stays", PowerState::PoweredOn, Some("name:stays\nprojectid:p"), None));
    api.vanish_summary("vm-1");
    api.set_perf("vm-2", vec![series(6, "", 3)]);
    let mut h = start(api, None).await;

    let report = h.poller.poll_once().await.unwrap();
    assert_eq!(report.inventory.vanished, 1);
    assert_eq!(report.sampled, 1);
    assert_eq!(h.api.queried_vms(), vec!["vm-2"]);
    assert_eq!(h.health.vanished_vms.load(Ordering::Relaxed), 1);
}

#[tokio::test]
async fn test_listing_failure_fails_cycle_only() {
    let api = single_vm_api();
    api.set_perf("vm-1", vec![series(6, "", 42)]);
    let mut h = start(api, None).await;

    h.api.fail_listing.store(true, Ordering::SeqCst);
    assert!(h.poller.poll_once().await.is_none());
    assert_eq!(h.health.cycle_failure_count.load(Ordering::Relaxed), 1);
    assert_eq!(h.health.last_cycle().map(|c| c.success), Some(false));
    assert_eq!(h.api.perf_query_count(), 0);

    h.api.fail_listing.store(false, Ordering::SeqCst);
    let report = h.poller.poll_once().await.unwrap();
    assert_eq!(report.sampled, 1);
    assert_eq!(h.health.last_cycle().map(|c| c.success), Some(true));
}

#[tokio::test]
async fn test_allow_list_limits_sampling_but_not_registration() {
    let api = single_vm_api();
    api.add_counter(24, "mem", "usage", "average");
    api.set_perf("vm-1", vec![series(6, "", 42), series(24, "", 5)]);
    let mut h = start(api, Some(vec!["cpu.usagemhz.average".into(), "net.bogus.sum".into()])).await;

    assert_eq!(h.poller.selected(), &[6]);
    assert_eq!(h.poller.gauges().len(), 2);

    h.poller.poll_once().await.unwrap();
    assert_eq!(sample_value(&h.registry, CPU, &demo_labels()), Some(42.0));
    assert!(!render(&h.registry).contains("vcenter_mem_usage_average{"));
}

#[tokio::test]
async fn test_empty_allow_list_samples_everything() {
    let api = single_vm_api();
    api.add_counter(24, "mem", "usage", "average");
    let h = start(api, Some(vec![])).await;
    assert_eq!(h.poller.selected(), &[6, 24]);
}

#[tokio::test]
async fn test_unknown_host_gives_empty_node_label() {
    let api = FakeApi::new();
    api.add_counter(6, "cpu", "usagemhz", "average");
    api.add_vm(
        "vm-1",
        vm("demo", PowerState::PoweredOn, Some(DEMO_ANNOTATION), Some("host-404")),
    );
    api.set_perf("vm-1", vec![series(6, "", 1)]);
    let mut h = start(api, None).await;

    h.poller.poll_once().await.unwrap();
    assert_eq!(
        sample_value(&h.registry, CPU, &[("vm_name", "demo"), ("vcenter_node", "")]),
        Some(1.0)
    );
}

#[tokio::test]
async fn test_session_loss_triggers_relogin_and_rebind() {
    let api = single_vm_api();
    api.set_perf("vm-1", vec![series(6, "", 42)]);
    let mut h = start(api, None).await;
    h.poller.poll_once().await.unwrap();

    // new session, new counter ids
    h.api.session_expired.store(true, Ordering::SeqCst);
    h.api
        .set_counters(vec![Counter::new(60, "cpu", "usagemhz", "average")]);
    h.api.set_perf("vm-1", vec![series(60, "", 99)]);

    assert!(h.poller.poll_once().await.is_none());
    assert_eq!(h.api.logins.load(Ordering::SeqCst), 1);
    assert_eq!(h.api.counter_queries.load(Ordering::SeqCst), 2);
    assert_eq!(h.poller.selected(), &[60]);
    assert_eq!(h.poller.catalog().id_of("cpu.usagemhz.average"), Some(60));
    assert_eq!(h.poller.gauges().len(), 1);
    assert_eq!(h.health.session_renewals.load(Ordering::Relaxed), 1);

    let report = h.poller.poll_once().await.unwrap();
    assert_eq!(report.samples.set, 1);
    assert_eq!(sample_value(&h.registry, CPU, &demo_labels()), Some(99.0));
}

#[tokio::test]
async fn test_self_metrics_follow_cycles() {
    let api = single_vm_api();
    api.set_perf("vm-1", vec![series(6, "", 42)]);
    let mut h = start(api, None).await;
    h.poller.poll_once().await.unwrap();

    let text = render(&h.registry);
    assert!(text.contains("vcenter_exporter_cycle_success 1"));
    assert!(text.contains("vcenter_exporter_vms_total 1"));
    assert!(text.contains("vcenter_exporter_vms_sampled 1"));
    assert!(text.contains("vcenter_exporter_counters_total 1"));
}

#[tokio::test]
async fn test_start_without_counters_fails() {
    use prometheus::Registry;
    use std::sync::Arc;
    use vcenter_exporter::annotation::AnnotationFilter;
    use vcenter_exporter::health_stats::HealthStats;
    use vcenter_exporter::inventory::NameShortener;
    use vcenter_exporter::poller::{Poller, PollerError};

    let api = FakeApi::new();
    let result = Poller::start(
        api,
        settings(None),
        AnnotationFilter::new("^name:").unwrap(),
        NameShortener::new(None).unwrap(),
        Registry::new(),
        Arc::new(HealthStats::new()),
    )
    .await;
    assert!(matches!(result, Err(PollerError::NoCounters)));
}
