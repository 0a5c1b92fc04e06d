use crate::config::StackConfig;
use crate::utils::error::{Result, StackError};
use std::collections::{BTreeMap, BTreeSet};

/// 服務啟動順序的計算結果
///
/// 依賴在前、被依賴者在後;同層以名稱字典序排序,
/// 讓每次執行的順序都一致。
#[derive(Debug, Clone)]
pub struct StartupPlan {
    order: Vec<String>,
}

impl StartupPlan {
    /// 由設定建立啟動計畫,可選擇只啟動部分服務(含其依賴閉包)
    pub fn build(config: &StackConfig, selection: Option<&[String]>) -> Result<Self> {
        let included = match selection {
            Some(names) if !names.is_empty() => selection_closure(config, names)?,
            _ => config.services.keys().cloned().collect(),
        };

        let order = topological_order(config, &included)?;
        Ok(Self { order })
    }

    pub fn startup_order(&self) -> &[String] {
        &self.order
    }

    /// 關閉順序與啟動相反
    pub fn shutdown_order(&self) -> Vec<String> {
        self.order.iter().rev().cloned().collect()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.order.iter().any(|entry| entry == name)
    }

    pub fn len(&self) -> usize {
        self.order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }
}

/// 選定服務加上它們的全部依賴
fn selection_closure(config: &StackConfig, names: &[String]) -> Result<BTreeSet<String>> {
    let mut included = BTreeSet::new();
    let mut pending: Vec<String> = Vec::new();

    for name in names {
        if !config.services.contains_key(name) {
            return Err(StackError::InvalidConfigValueError {
                field: "services".to_string(),
                value: name.clone(),
                reason: "unknown service name".to_string(),
            });
        }
        pending.push(name.clone());
    }

    while let Some(name) = pending.pop() {
        if !included.insert(name.clone()) {
            continue;
        }
        if let Some(service) = config.services.get(&name) {
            for dependency in service.depends_on.normalized().keys() {
                pending.push(dependency.clone());
            }
        }
    }

    Ok(included)
}

fn topological_order(config: &StackConfig, included: &BTreeSet<String>) -> Result<Vec<String>> {
    let mut in_degree: BTreeMap<&str, usize> = BTreeMap::new();
    let mut dependents: BTreeMap<&str, Vec<&str>> = BTreeMap::new();

    for name in included {
        in_degree.entry(name.as_str()).or_insert(0);
        if let Some(service) = config.services.get(name) {
            for dependency in service.depends_on.normalized().keys() {
                if let Some(dep) = included.get(dependency.as_str()) {
                    *in_degree.entry(name.as_str()).or_insert(0) += 1;
                    dependents.entry(dep.as_str()).or_default().push(name.as_str());
                }
            }
        }
    }

    // BTreeSet 讓同層的服務照字典序出列
    let mut ready: BTreeSet<&str> = in_degree
        .iter()
        .filter(|(_, degree)| **degree == 0)
        .map(|(name, _)| *name)
        .collect();
    let mut order = Vec::with_capacity(included.len());

    while let Some(name) = ready.iter().next().copied() {
        ready.remove(name);
        order.push(name.to_string());
        if let Some(next) = dependents.get(name) {
            for &dependent in next {
                let degree = in_degree.entry(dependent).or_insert(0);
                *degree -= 1;
                if *degree == 0 {
                    ready.insert(dependent);
                }
            }
        }
    }

    if order.len() != included.len() {
        return Err(StackError::ConfigValidationError {
            field: "services".to_string(),
            message: "Circular dependency detected between services".to_string(),
        });
    }

    Ok(order)
}
