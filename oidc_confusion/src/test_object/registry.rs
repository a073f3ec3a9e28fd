use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::{Duration, Instant};

use crate::config::{OIDC_CONFUSION_TEST_ID_LENGTH, OIDC_CONFUSION_TEST_OBJECT_LIFETIME};
use crate::plan::{PlanKind, TestPlans};
use crate::types::TestId;
use crate::utils::gen_alphanumeric;

use super::errors::TestObjectError;
use super::object::TestObject;

struct Entry {
    object: Arc<TestObject>,
    last_access: Instant,
}

/// Cache of live test objects with idle expiry.
pub struct TestObjectRegistry {
    plans: TestPlans,
    lifetime: Duration,
    id_length: usize,
    objects: Mutex<HashMap<TestId, Entry>>,
}

impl TestObjectRegistry {
    pub fn new(plans: TestPlans, lifetime: Duration, id_length: usize) -> Self {
        Self {
            plans,
            lifetime,
            id_length,
            objects: Mutex::new(HashMap::new()),
        }
    }

    /// Lifetime and id length from the environment.
    pub fn from_env(plans: TestPlans) -> Self {
        Self::new(
            plans,
            *OIDC_CONFUSION_TEST_OBJECT_LIFETIME,
            *OIDC_CONFUSION_TEST_ID_LENGTH,
        )
    }

    pub fn plans(&self) -> &TestPlans {
        &self.plans
    }

    pub fn create_rp_test_object(&self) -> Result<Arc<TestObject>, TestObjectError> {
        self.create(PlanKind::Rp)
    }

    pub fn create_op_test_object(&self) -> Result<Arc<TestObject>, TestObjectError> {
        self.create(PlanKind::Op)
    }

    fn create(&self, kind: PlanKind) -> Result<Arc<TestObject>, TestObjectError> {
        let mut objects = self.objects.lock().unwrap_or_else(PoisonError::into_inner);
        self.sweep(&mut objects);

        let test_id = loop {
            let candidate = TestId::new(gen_alphanumeric(self.id_length)?);
            if !objects.contains_key(&candidate) {
                break candidate;
            }
        };
        let object = Arc::new(TestObject::new(test_id.clone(), kind, self.plans.get(kind)));
        objects.insert(
            test_id.clone(),
            Entry {
                object: object.clone(),
                last_access: Instant::now(),
            },
        );
        tracing::info!("Created {:?} test object {}", kind, test_id);
        Ok(object)
    }

    /// Look up a test object and refresh its idle timer.
    pub fn get(&self, test_id: &str) -> Result<Arc<TestObject>, TestObjectError> {
        let mut objects = self.objects.lock().unwrap_or_else(PoisonError::into_inner);
        self.sweep(&mut objects);
        let entry = objects
            .get_mut(&TestId::from(test_id))
            .ok_or_else(|| TestObjectError::NotFound(test_id.to_string()))?;
        entry.last_access = Instant::now();
        Ok(entry.object.clone())
    }

    /// Remove a test object. Returns whether it existed.
    pub fn delete(&self, test_id: &str) -> bool {
        let mut objects = self.objects.lock().unwrap_or_else(PoisonError::into_inner);
        self.sweep(&mut objects);
        let removed = objects.remove(&TestId::from(test_id)).is_some();
        if removed {
            tracing::info!("Deleted test object {}", test_id);
        }
        removed
    }

    pub fn len(&self) -> usize {
        let mut objects = self.objects.lock().unwrap_or_else(PoisonError::into_inner);
        self.sweep(&mut objects);
        objects.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn sweep(&self, objects: &mut HashMap<TestId, Entry>) {
        let lifetime = self.lifetime;
        objects.retain(|test_id, entry| {
            let alive = entry.last_access.elapsed() < lifetime;
            if !alive {
                tracing::info!("Test object {} expired", test_id);
            }
            alive
        });
    }
}
