use std::time::Duration;

use metrics::{counter, gauge, histogram};

use super::InternalEvent;

#[derive(Clone, Copy, Debug)]
pub(crate) struct RateGateStarted<'a> {
    pub gate: &'a str,
    pub target_per_minute: u32,
    pub target_per_second: u32,
}

impl InternalEvent for RateGateStarted<'_> {
    fn emit(self) {
        counter!("rate_gate_started_total", "gate" => self.gate.to_owned()).increment(1);
        info!(
            target: "rate_gate::stats",
            gate = self.gate,
            target_per_minute = self.target_per_minute,
            target_per_second = self.target_per_second,
            "Init Success"
        );
    }
}

#[derive(Clone, Copy, Debug)]
pub(crate) struct RateGateQuotaExhausted<'a> {
    pub gate: &'a str,
    pub reserved: u64,
    pub allowed_per_minute: u32,
}

impl InternalEvent for RateGateQuotaExhausted<'_> {
    fn emit(self) {
        counter!("rate_gate_quota_waits_total", "gate" => self.gate.to_owned()).increment(1);
        info!(
            target: "rate_gate::stats",
            gate = self.gate,
            reserved = self.reserved,
            allowed_per_minute = self.allowed_per_minute,
            "Reached per-minute quota, waiting for period reset"
        );
    }
}

#[derive(Clone, Copy, Debug)]
pub(crate) struct RateGateWindowReport<'a> {
    pub gate: &'a str,
    pub completed: u64,
    pub window: Duration,
    pub target_per_second: u32,
    pub admitted_this_period: u64,
}

impl RateGateWindowReport<'_> {
    pub(crate) fn current_per_second(&self) -> u64 {
        match self.window.as_secs() {
            0 => self.completed,
            secs => self.completed / secs,
        }
    }
}

impl InternalEvent for RateGateWindowReport<'_> {
    fn emit(self) {
        let current_per_second = self.current_per_second();

        histogram!("rate_gate_window_completed", "gate" => self.gate.to_owned())
            .record(self.completed as f64);
        gauge!("rate_gate_current_per_second", "gate" => self.gate.to_owned())
            .set(current_per_second as f64);
        gauge!("rate_gate_admitted_this_period", "gate" => self.gate.to_owned())
            .set(self.admitted_this_period as f64);

        info!(
            target: "rate_gate::stats",
            gate = self.gate,
            completed = self.completed,
            window_secs = self.window.as_secs(),
            target_per_second = self.target_per_second,
            current_per_second,
            admitted_this_period = self.admitted_this_period,
            "Window completed"
        );
    }
}

#[derive(Clone, Copy, Debug)]
pub(crate) struct RateGatePeriodReport<'a> {
    pub gate: &'a str,
    pub admitted: u64,
    pub allowed_per_minute: u32,
}

impl InternalEvent for RateGatePeriodReport<'_> {
    fn emit(self) {
        histogram!("rate_gate_period_admitted", "gate" => self.gate.to_owned())
            .record(self.admitted as f64);
        info!(
            target: "rate_gate::stats",
            gate = self.gate,
            admitted = self.admitted,
            allowed_per_minute = self.allowed_per_minute,
            "Period Stats (last 1 minute)"
        );
    }
}
