// ==========================================
// 固化罐装载分配系统 - 字段映射器
// ==========================================
// 职责: 原始行 → 领域对象 + 类型转换
// 列名已规范化（小写），支持中英文别名
// 外形四项任一缺失 → footprint = None（由分组前校验剔除）
// ==========================================

use crate::domain::types::{VesselStatus, WorkOrderStatus};
use crate::domain::vessel::{ElevatedLevel, Vessel};
use crate::domain::work_order::{CureCycle, CureStage, ToolFootprint, WorkOrder};
use crate::importer::error::{ImportError, ImportResult};
use crate::importer::file_parser::RawRow;
use chrono::Local;

pub struct FieldMapper;

impl FieldMapper {
    // ==========================================
    // 工单
    // ==========================================
    pub fn map_work_order(&self, row: &RawRow, row_number: usize) -> ImportResult<WorkOrder> {
        let wo_id = self.require_string(row, "wo_id", row_number)?;
        let width = self.parse_f64(row, "width_mm", row_number)?;
        let height = self.parse_f64(row, "height_mm", row_number)?;
        let weight = self.parse_f64(row, "weight_kg", row_number)?;
        let connectors = self.parse_u32(row, "connector_count", row_number)?;
        let rotation_allowed = self.parse_bool(row, "rotation_allowed", row_number)?.unwrap_or(true);

        let footprint = match (width, height, weight, connectors) {
            (Some(width_mm), Some(height_mm), Some(weight_kg), Some(connector_count)) => {
                Some(ToolFootprint {
                    width_mm,
                    height_mm,
                    weight_kg,
                    connector_count,
                    rotation_allowed,
                })
            }
            _ => None,
        };

        let status = match self.get_string(row, "status") {
            None => WorkOrderStatus::AwaitingCure,
            // CURING / DONE 只能由方案流转写入
            Some(value) => WorkOrderStatus::from_db_str(&value.to_uppercase())
                .filter(|s| !matches!(s, WorkOrderStatus::Curing | WorkOrderStatus::Done))
                .ok_or_else(|| ImportError::InvalidValue {
                    row: row_number,
                    field: "status".to_string(),
                    value,
                })?,
        };

        Ok(WorkOrder {
            wo_id,
            part_ref: self.get_string(row, "part_ref").unwrap_or_default(),
            footprint,
            cure_cycle_id: self.get_string(row, "cure_cycle_id"),
            priority: self.parse_i32(row, "priority", row_number)?.unwrap_or(0),
            status,
            previous_status: None,
            revision: 0,
            updated_at: Local::now().naive_local(),
        })
    }

    // ==========================================
    // 固化罐
    // ==========================================
    pub fn map_vessel(&self, row: &RawRow, row_number: usize) -> ImportResult<Vessel> {
        let vessel_id = self.require_string(row, "vessel_id", row_number)?;
        let usable_width_mm = self.require_f64(row, "usable_width_mm", row_number)?;
        let usable_length_mm = self.require_f64(row, "usable_length_mm", row_number)?;
        let weight_limit_kg = self.require_f64(row, "weight_limit_kg", row_number)?;
        let connector_capacity = self
            .parse_u32(row, "connector_capacity", row_number)?
            .ok_or_else(|| missing(row_number, "connector_capacity"))?;

        let elevated = match (
            self.parse_f64(row, "support_height_mm", row_number)?,
            self.parse_u32(row, "max_supports", row_number)?,
            self.parse_f64(row, "per_support_weight_kg", row_number)?,
        ) {
            (Some(support_height_mm), Some(max_supports), Some(per_support_weight_kg)) => {
                Some(ElevatedLevel {
                    support_height_mm,
                    max_supports,
                    per_support_weight_kg,
                    clearance_mm: self.parse_f64(row, "clearance_mm", row_number)?.unwrap_or(0.0),
                })
            }
            _ => None,
        };

        let status = match self.get_string(row, "status") {
            None => VesselStatus::Available,
            Some(value) => VesselStatus::from_db_str(&value.to_uppercase())
                .filter(|s| *s != VesselStatus::InUse)
                .ok_or_else(|| ImportError::InvalidValue {
                    row: row_number,
                    field: "status".to_string(),
                    value,
                })?,
        };

        Ok(Vessel {
            name: self.get_string(row, "name").unwrap_or_else(|| vessel_id.clone()),
            vessel_id,
            usable_width_mm,
            usable_length_mm,
            weight_limit_kg,
            connector_capacity,
            elevated,
            status,
            revision: 0,
            updated_at: Local::now().naive_local(),
        })
    }

    // ==========================================
    // 固化制度（1 或 2 段）
    // ==========================================
    pub fn map_cure_cycle(&self, row: &RawRow, row_number: usize) -> ImportResult<CureCycle> {
        let cycle_id = self.require_string(row, "cycle_id", row_number)?;
        let mut stages = Vec::with_capacity(2);
        for n in 1..=2 {
            let temperature = self.parse_f64(row, &format!("stage{}_temperature_c", n), row_number)?;
            let pressure = self.parse_f64(row, &format!("stage{}_pressure_bar", n), row_number)?;
            let duration = self.parse_u32(row, &format!("stage{}_duration_min", n), row_number)?;
            if let (Some(temperature_c), Some(pressure_bar), Some(duration_min)) =
                (temperature, pressure, duration)
            {
                stages.push(CureStage {
                    temperature_c,
                    pressure_bar,
                    duration_min,
                });
            }
        }

        let cycle = CureCycle {
            name: self.get_string(row, "name").unwrap_or_else(|| cycle_id.clone()),
            cycle_id,
            stages,
        };
        if !cycle.is_valid() {
            return Err(ImportError::InvalidValue {
                row: row_number,
                field: "stages".to_string(),
                value: format!("{} stage(s)", cycle.stages.len()),
            });
        }
        Ok(cycle)
    }

    // ==========================================
    // 取值与转换
    // ==========================================

    /// 提取字符串字段，按别名依次尝试
    fn get_string(&self, row: &RawRow, key: &str) -> Option<String> {
        let aliases: &[&str] = match key {
            "wo_id" => &["wo_id", "work_order_id", "工单号"],
            "part_ref" => &["part_ref", "part_no", "零件号"],
            "width_mm" => &["width_mm", "宽度"],
            "height_mm" => &["height_mm", "length_mm", "长度"],
            "weight_kg" => &["weight_kg", "重量"],
            "connector_count" => &["connector_count", "connectors", "接口数"],
            "cure_cycle_id" => &["cure_cycle_id", "cycle_id", "固化曲线"],
            "priority" => &["priority", "优先级"],
            "vessel_id" => &["vessel_id", "罐号"],
            "status" => &["status", "状态"],
            _ => &[],
        };

        std::iter::once(key)
            .chain(aliases.iter().copied())
            .filter_map(|alias| row.get(alias))
            .map(|v| v.trim())
            .find(|v| !v.is_empty())
            .map(str::to_string)
    }

    fn require_string(&self, row: &RawRow, key: &str, row_number: usize) -> ImportResult<String> {
        self.get_string(row, key).ok_or_else(|| missing(row_number, key))
    }

    fn parse_f64(&self, row: &RawRow, key: &str, row_number: usize) -> ImportResult<Option<f64>> {
        match self.get_string(row, key) {
            None => Ok(None),
            Some(value) => value
                .parse::<f64>()
                .map(Some)
                .map_err(|_| conversion(row_number, key, format!("无法解析为浮点数: {}", value))),
        }
    }

    fn require_f64(&self, row: &RawRow, key: &str, row_number: usize) -> ImportResult<f64> {
        self.parse_f64(row, key, row_number)?
            .ok_or_else(|| missing(row_number, key))
    }

    fn parse_u32(&self, row: &RawRow, key: &str, row_number: usize) -> ImportResult<Option<u32>> {
        match self.get_string(row, key) {
            None => Ok(None),
            Some(value) => {
                // Excel 数值单元格读出来是 "4" 或 "4.0"
                let trimmed = value.strip_suffix(".0").unwrap_or(&value);
                trimmed
                    .parse::<u32>()
                    .map(Some)
                    .map_err(|_| conversion(row_number, key, format!("无法解析为非负整数: {}", value)))
            }
        }
    }

    fn parse_i32(&self, row: &RawRow, key: &str, row_number: usize) -> ImportResult<Option<i32>> {
        match self.get_string(row, key) {
            None => Ok(None),
            Some(value) => {
                let trimmed = value.strip_suffix(".0").unwrap_or(&value);
                trimmed
                    .parse::<i32>()
                    .map(Some)
                    .map_err(|_| conversion(row_number, key, format!("无法解析为整数: {}", value)))
            }
        }
    }

    fn parse_bool(&self, row: &RawRow, key: &str, row_number: usize) -> ImportResult<Option<bool>> {
        match self.get_string(row, key) {
            None => Ok(None),
            Some(value) => match value.to_lowercase().as_str() {
                "1" | "true" | "y" | "yes" | "是" => Ok(Some(true)),
                "0" | "false" | "n" | "no" | "否" => Ok(Some(false)),
                _ => Err(conversion(row_number, key, format!("无法解析为布尔值: {}", value))),
            },
        }
    }
}

fn missing(row: usize, field: &str) -> ImportError {
    ImportError::MissingField {
        row,
        field: field.to_string(),
    }
}

fn conversion(row: usize, field: &str, message: String) -> ImportError {
    ImportError::TypeConversionError {
        row,
        field: field.to_string(),
        message,
    }
}
