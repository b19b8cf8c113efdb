//! In-process store with the same semantics as the MySQL schema, for tests.

use std::collections::{BTreeMap, HashSet};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use chrono::{NaiveDate, NaiveDateTime};

use super::{BiometricRepository, PipelineStats, ReconcileFilter, ReconcileTx, StoreError};
use crate::model::attendance::AttendanceDay;
use crate::model::device::{Device, DeviceOverview, DeviceStatus};
use crate::model::employee::UnmappedEmployee;
use crate::model::punch_log::{CanonicalPunch, MappedPunch, PunchKey, UnmappedBiometricId};

#[derive(Debug, Clone)]
pub struct StoredPunch {
    pub id: u64,
    pub device_id: String,
    pub biometric_user_id: String,
    pub punch_time: NaiveDateTime,
    pub processed: bool,
}

#[derive(Debug, Clone)]
pub struct StoredEmployee {
    pub id: u64,
    pub biometric_id: Option<String>,
    pub active: bool,
}

#[derive(Debug, Clone, Default)]
pub struct MemoryState {
    pub devices: Vec<Device>,
    pub punches: Vec<StoredPunch>,
    pub employees: Vec<StoredEmployee>,
    pub attendance: BTreeMap<(u64, NaiveDate), AttendanceDay>,
    next_id: u64,
}

impl MemoryState {
    fn next_id(&mut self) -> u64 {
        self.next_id += 1;
        self.next_id
    }

    fn active_employee_for(&self, biometric_user_id: &str) -> Option<u64> {
        self.employees
            .iter()
            .find(|e| e.active && e.biometric_id.as_deref() == Some(biometric_user_id))
            .map(|e| e.id)
    }
}

#[derive(Clone, Default)]
pub struct MemoryRepository {
    state: Arc<Mutex<MemoryState>>,
    /// Makes `punch_exists` always answer false, as a concurrent sync would see it.
    stale_reads: Arc<Mutex<bool>>,
    /// Biometric ids whose insert fails with a database error.
    poisoned_ids: Arc<Mutex<HashSet<String>>>,
    /// Employees whose attendance writes fail inside a reconcile transaction.
    failing_attendance: Arc<Mutex<HashSet<u64>>>,
}

impl MemoryRepository {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_device(&self, device_id: &str, status: DeviceStatus) {
        let mut state = self.state.lock().unwrap();
        let id = state.next_id();
        state.devices.push(Device {
            id,
            device_id: device_id.to_string(),
            name: device_id.to_string(),
            status,
            last_sync: None,
            created_at: NaiveDateTime::default(),
        });
    }

    pub fn add_employee(&self, id: u64, biometric_id: Option<&str>, active: bool) {
        self.state.lock().unwrap().employees.push(StoredEmployee {
            id,
            biometric_id: biometric_id.map(str::to_string),
            active,
        });
    }

    pub fn set_employee_active(&self, id: u64, active: bool) {
        let mut state = self.state.lock().unwrap();
        if let Some(e) = state.employees.iter_mut().find(|e| e.id == id) {
            e.active = active;
        }
    }

    pub fn put_attendance(&self, day: AttendanceDay) {
        self.state
            .lock()
            .unwrap()
            .attendance
            .insert((day.employee_id, day.date), day);
    }

    pub fn attendance(&self, employee_id: u64, date: NaiveDate) -> Option<AttendanceDay> {
        self.state
            .lock()
            .unwrap()
            .attendance
            .get(&(employee_id, date))
            .cloned()
    }

    pub fn attendance_count(&self) -> usize {
        self.state.lock().unwrap().attendance.len()
    }

    pub fn punches(&self) -> Vec<StoredPunch> {
        self.state.lock().unwrap().punches.clone()
    }

    pub fn device(&self, device_id: &str) -> Option<Device> {
        self.state
            .lock()
            .unwrap()
            .devices
            .iter()
            .find(|d| d.device_id == device_id)
            .cloned()
    }

    pub fn set_stale_reads(&self, stale: bool) {
        *self.stale_reads.lock().unwrap() = stale;
    }

    pub fn poison_biometric_id(&self, biometric_user_id: &str) {
        self.poisoned_ids
            .lock()
            .unwrap()
            .insert(biometric_user_id.to_string());
    }

    pub fn fail_attendance_writes(&self, employee_id: u64) {
        self.failing_attendance.lock().unwrap().insert(employee_id);
    }

    pub fn restore_attendance_writes(&self, employee_id: u64) {
        self.failing_attendance.lock().unwrap().remove(&employee_id);
    }
}

fn simulated_failure() -> StoreError {
    StoreError::Database(sqlx::Error::Protocol("simulated write failure".to_string()))
}

#[async_trait]
impl BiometricRepository for MemoryRepository {
    async fn find_device(&self, device_id: &str) -> Result<Option<Device>, StoreError> {
        Ok(self.device(device_id))
    }

    async fn insert_device(&self, device_id: &str, name: &str) -> Result<Device, StoreError> {
        let mut state = self.state.lock().unwrap();
        if state.devices.iter().any(|d| d.device_id == device_id) {
            return Err(StoreError::Duplicate);
        }
        let device = Device {
            id: state.next_id(),
            device_id: device_id.to_string(),
            name: name.to_string(),
            status: DeviceStatus::Active,
            last_sync: None,
            created_at: NaiveDateTime::default(),
        };
        state.devices.push(device.clone());
        Ok(device)
    }

    async fn list_devices(&self) -> Result<Vec<DeviceOverview>, StoreError> {
        let state = self.state.lock().unwrap();
        Ok(state
            .devices
            .iter()
            .map(|d| {
                let logs = state.punches.iter().filter(|p| p.device_id == d.device_id);
                let total = logs.clone().count() as i64;
                let unprocessed = logs.filter(|p| !p.processed).count() as i64;
                DeviceOverview::new(d.clone(), total, unprocessed)
            })
            .collect())
    }

    async fn active_devices(&self) -> Result<Vec<Device>, StoreError> {
        let state = self.state.lock().unwrap();
        Ok(state.devices.iter().filter(|d| d.is_active()).cloned().collect())
    }

    async fn delete_device(&self, device_id: &str) -> Result<bool, StoreError> {
        let mut state = self.state.lock().unwrap();
        let before = state.devices.len();
        state.devices.retain(|d| d.device_id != device_id);
        if state.devices.len() == before {
            return Ok(false);
        }
        state.punches.retain(|p| p.device_id != device_id);
        Ok(true)
    }

    async fn touch_sync(&self, device_id: &str, at: NaiveDateTime) -> Result<(), StoreError> {
        let mut state = self.state.lock().unwrap();
        if let Some(d) = state.devices.iter_mut().find(|d| d.device_id == device_id) {
            d.last_sync = Some(at);
        }
        Ok(())
    }

    async fn punch_exists(&self, key: PunchKey<'_>) -> Result<bool, StoreError> {
        if *self.stale_reads.lock().unwrap() {
            return Ok(false);
        }
        let state = self.state.lock().unwrap();
        Ok(state.punches.iter().any(|p| {
            p.device_id == key.device_id
                && p.biometric_user_id == key.biometric_user_id
                && p.punch_time == key.punch_time
        }))
    }

    async fn insert_punch(&self, device_id: &str, punch: &CanonicalPunch) -> Result<(), StoreError> {
        if self.poisoned_ids.lock().unwrap().contains(&punch.biometric_user_id) {
            return Err(simulated_failure());
        }

        let mut state = self.state.lock().unwrap();
        let duplicate = state.punches.iter().any(|p| {
            p.device_id == device_id
                && p.biometric_user_id == punch.biometric_user_id
                && p.punch_time == punch.punch_time
        });
        if duplicate {
            return Err(StoreError::Duplicate);
        }

        let id = state.next_id();
        state.punches.push(StoredPunch {
            id,
            device_id: device_id.to_string(),
            biometric_user_id: punch.biometric_user_id.clone(),
            punch_time: punch.punch_time,
            processed: false,
        });
        Ok(())
    }

    async fn unmapped_biometric_ids(&self) -> Result<Vec<UnmappedBiometricId>, StoreError> {
        let state = self.state.lock().unwrap();
        let mut grouped: BTreeMap<&str, Vec<NaiveDateTime>> = BTreeMap::new();
        for p in &state.punches {
            if state.active_employee_for(&p.biometric_user_id).is_none() {
                grouped.entry(&p.biometric_user_id).or_default().push(p.punch_time);
            }
        }

        Ok(grouped
            .into_iter()
            .map(|(id, times)| {
                let days: HashSet<NaiveDate> = times.iter().map(|t| t.date()).collect();
                UnmappedBiometricId {
                    biometric_user_id: id.to_string(),
                    punch_count: times.len() as i64,
                    first_seen: *times.iter().min().unwrap(),
                    last_seen: *times.iter().max().unwrap(),
                    distinct_days: days.len() as i64,
                }
            })
            .collect())
    }

    async fn employees_without_biometric_id(&self) -> Result<Vec<UnmappedEmployee>, StoreError> {
        let state = self.state.lock().unwrap();
        Ok(state
            .employees
            .iter()
            .filter(|e| e.active && e.biometric_id.as_deref().is_none_or(str::is_empty))
            .map(|e| UnmappedEmployee {
                id: e.id,
                employee_code: format!("EMP-{:03}", e.id),
                first_name: "Test".to_string(),
                last_name: format!("Employee{}", e.id),
            })
            .collect())
    }

    async fn stats(&self) -> Result<PipelineStats, StoreError> {
        let state = self.state.lock().unwrap();
        let mapped = |e: &&StoredEmployee| e.biometric_id.as_deref().is_some_and(|b| !b.is_empty());
        Ok(PipelineStats {
            active_devices: state.devices.iter().filter(|d| d.is_active()).count() as i64,
            unprocessed_logs: state.punches.iter().filter(|p| !p.processed).count() as i64,
            processed_logs: state.punches.iter().filter(|p| p.processed).count() as i64,
            last_sync: state.devices.iter().filter_map(|d| d.last_sync).max(),
            mapped_employees: state.employees.iter().filter(|e| e.active).filter(mapped).count()
                as i64,
            unmapped_employees: state
                .employees
                .iter()
                .filter(|e| e.active)
                .filter(|e| !mapped(e))
                .count() as i64,
        })
    }

    async fn begin_reconcile(&self) -> Result<Box<dyn ReconcileTx>, StoreError> {
        let snapshot = self.state.lock().unwrap().clone();
        Ok(Box::new(MemoryReconcileTx {
            target: self.state.clone(),
            working: snapshot,
            failing_attendance: self.failing_attendance.lock().unwrap().clone(),
        }))
    }
}

/// Works on a copy and swaps it in on commit.
pub struct MemoryReconcileTx {
    target: Arc<Mutex<MemoryState>>,
    working: MemoryState,
    failing_attendance: HashSet<u64>,
}

fn filter_matches(filter: &ReconcileFilter, device_id: &str, punch_time: NaiveDateTime) -> bool {
    let date = punch_time.date();
    date >= filter.start_date
        && date <= filter.end_date
        && filter.device_id.as_deref().is_none_or(|d| d == device_id)
}

impl MemoryReconcileTx {
    fn check_writable(&self, day: &AttendanceDay) -> Result<(), StoreError> {
        if self.failing_attendance.contains(&day.employee_id) {
            return Err(simulated_failure());
        }
        Ok(())
    }

    fn selected(&self, filter: &ReconcileFilter) -> Vec<MappedPunch> {
        self.working
            .punches
            .iter()
            .filter(|p| !p.processed && filter_matches(filter, &p.device_id, p.punch_time))
            .filter_map(|p| {
                self.working
                    .active_employee_for(&p.biometric_user_id)
                    .map(|employee_id| MappedPunch {
                        id: p.id,
                        device_id: p.device_id.clone(),
                        employee_id,
                        punch_time: p.punch_time,
                    })
            })
            .collect()
    }
}

#[async_trait]
impl ReconcileTx for MemoryReconcileTx {
    async fn unprocessed_punches(
        &mut self,
        filter: &ReconcileFilter,
    ) -> Result<Vec<MappedPunch>, StoreError> {
        Ok(self.selected(filter))
    }

    async fn attendance_day(
        &mut self,
        employee_id: u64,
        date: NaiveDate,
    ) -> Result<Option<AttendanceDay>, StoreError> {
        Ok(self.working.attendance.get(&(employee_id, date)).cloned())
    }

    async fn insert_attendance_day(&mut self, day: &AttendanceDay) -> Result<(), StoreError> {
        self.check_writable(day)?;
        let key = (day.employee_id, day.date);
        if self.working.attendance.contains_key(&key) {
            return Err(StoreError::Duplicate);
        }
        self.working.attendance.insert(key, day.clone());
        Ok(())
    }

    async fn update_attendance_day(&mut self, day: &AttendanceDay) -> Result<(), StoreError> {
        self.check_writable(day)?;
        self.working
            .attendance
            .insert((day.employee_id, day.date), day.clone());
        Ok(())
    }

    async fn mark_processed(&mut self, filter: &ReconcileFilter) -> Result<u64, StoreError> {
        let ids: HashSet<u64> = self.selected(filter).into_iter().map(|p| p.id).collect();
        for p in self.working.punches.iter_mut() {
            if ids.contains(&p.id) {
                p.processed = true;
            }
        }
        Ok(ids.len() as u64)
    }

    async fn commit(self: Box<Self>) -> Result<(), StoreError> {
        let MemoryReconcileTx { target, working, .. } = *self;
        *target.lock().unwrap() = working;
        Ok(())
    }
}
