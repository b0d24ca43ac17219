//! Key naming shared with every other process using the store.

/// Lock record key: `lock_{app}:{lock}`.
pub fn lock_key(app_name: &str, lock: &str) -> String {
    format!("lock_{}:{}", app_name, lock)
}

/// Main list of a queue: `queue_{app}:{function}`.
pub fn queue_key(app_name: &str, function_name: &str) -> String {
    format!("queue_{}:{}", app_name, function_name)
}

/// Processing list of a queue: `processing_{app}:{function}`.
pub fn processing_key(app_name: &str, function_name: &str) -> String {
    format!("processing_{}:{}", app_name, function_name)
}

/// Terminal result of one task: `result:{function}:{task_id}`.
pub fn result_key(function_name: &str, task_id: &str) -> String {
    format!("result:{}:{}", function_name, task_id)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_key_patterns() {
        assert_eq!(lock_key("extractor", "input_data"), "lock_extractor:input_data");
        assert_eq!(queue_key("extractor", "pdf_queue"), "queue_extractor:pdf_queue");
        assert_eq!(
            processing_key("extractor", "pdf_queue"),
            "processing_extractor:pdf_queue"
        );
        assert_eq!(result_key("pdf_queue", "abc"), "result:pdf_queue:abc");
    }
}
