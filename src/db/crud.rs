use sqlx::{Executor, Result, Sqlite};

use super::{NewRecord, ProfileRow, RecordRow, encode_vector};

/// 添加一条记录
pub async fn add_record<'c, E>(executor: E, record: &NewRecord) -> Result<i64>
where
    E: Executor<'c, Database = Sqlite>,
{
    let (id,): (i64,) = sqlx::query_as(
        r#"
        INSERT INTO record (record_id, vector, ethnicity, skin_type, age)
        VALUES (?, ?, ?, ?, ?)
        RETURNING id
        "#,
    )
    .bind(&record.record_id)
    .bind(encode_vector(&record.vector))
    .bind(&record.ethnicity)
    .bind(record.skin_type.map(i64::from))
    .bind(record.age.map(i64::from))
    .fetch_one(executor)
    .await?;

    Ok(id)
}

/// 检查记录 ID 是否存在
pub async fn check_record_id<'c, E>(executor: E, record_id: &str) -> Result<bool>
where
    E: Executor<'c, Database = Sqlite>,
{
    let (count,): (i64,) = sqlx::query_as("SELECT COUNT(*) FROM record WHERE record_id = ?")
        .bind(record_id)
        .fetch_one(executor)
        .await?;

    Ok(count > 0)
}

/// 查询单条记录的人口统计字段
pub async fn get_profile<'c, E>(executor: E, record_id: &str) -> Result<Option<ProfileRow>>
where
    E: Executor<'c, Database = Sqlite>,
{
    sqlx::query_as(
        r#"
        SELECT record_id, ethnicity, skin_type, age FROM record WHERE record_id = ?
        "#,
    )
    .bind(record_id)
    .fetch_optional(executor)
    .await
}

/// 按插入顺序获取全部记录
pub async fn get_all_records<'c, E>(executor: E) -> Result<Vec<RecordRow>>
where
    E: Executor<'c, Database = Sqlite>,
{
    sqlx::query_as(
        r#"
        SELECT id, record_id, vector, ethnicity, skin_type, age FROM record ORDER BY id ASC
        "#,
    )
    .fetch_all(executor)
    .await
}

/// 记录总数
pub async fn count_records<'c, E>(executor: E) -> Result<i64>
where
    E: Executor<'c, Database = Sqlite>,
{
    let (count,): (i64,) =
        sqlx::query_as("SELECT COUNT(*) FROM record").fetch_one(executor).await?;
    Ok(count)
}
