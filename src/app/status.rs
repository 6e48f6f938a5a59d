use hostbridge::document::ValidationReport;
use hostbridge::orchestrator::SessionReport;
use hostbridge::remote::RemoteHealth;

pub fn render_session(report: &SessionReport) -> String {
    let mut lines = vec![
        "◆ Session complete".to_string(),
        String::new(),
        format!("  Bridge       {}", report.bridge_dir.display()),
        format!(
            "  Mode         {:?}{}",
            report.mode,
            if report.downgraded { " (downgraded)" } else { "" }
        ),
        format!("  Ack          {}", if report.acked { "received" } else { "timed out" }),
        format!("  Answers      {}", report.answers.len()),
        String::new(),
    ];
    for answer in &report.answers {
        lines.push(format!(
            "   {:<12} option {} ({}) {:>7.0}ms  -> {}",
            answer.question_id,
            answer.option_index,
            answer.direction,
            answer.response_time_ms,
            answer.expert
        ));
    }
    lines.push(String::new());
    for (dimension, value) in &report.profile.dimensions {
        lines.push(format!("   {dimension:<24} {value:.2}"));
    }
    lines.push(String::new());
    lines.push(format!("  Checksum     {}", report.profile.checksum));
    lines.push(format!("  Profile      {}", report.profile_path.display()));
    lines.push(format!("  Anchor       {}", report.anchor));
    lines.join("\n")
}

pub fn render_validation(report: &ValidationReport) -> String {
    let mut lines = vec![format!(
        "◆ Bridge document: {}",
        match (report.file_exists, report.valid) {
            (false, _) => "missing",
            (true, true) => "valid",
            (true, false) => "invalid",
        }
    )];
    if let Some(status) = report.sync_status {
        lines.push(format!("  sync_status   {status}"));
    }
    if let Some(kind) = report.message_type {
        lines.push(format!("  message_type  {kind}"));
    }
    lines.extend(report.errors.iter().map(|e| format!("  ✗ {e}")));
    lines.extend(report.warnings.iter().map(|w| format!("  ! {w}")));
    lines.join("\n")
}

pub fn render_health(health: &RemoteHealth) -> String {
    let mut lines = vec![
        format!("◆ Remote host {}", health.base_url),
        format!("  Connected    {}", if health.connected { "yes" } else { "no" }),
        format!(
            "  Breaker      {} ({} consecutive failures)",
            health.circuit_state, health.consecutive_failures
        ),
        format!("  Uptime       {:.1}s", health.metrics.uptime_seconds),
    ];
    for (name, count) in &health.metrics.counters {
        lines.push(format!("   {name:<36} {count}"));
    }
    for (name, stats) in &health.metrics.latencies {
        lines.push(format!(
            "   {name:<20} n={} avg={:.1}ms p95={:.1}ms max={:.1}ms",
            stats.count, stats.avg_ms, stats.p95_ms, stats.max_ms
        ));
    }
    lines.join("\n")
}
