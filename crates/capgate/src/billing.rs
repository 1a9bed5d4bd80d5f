//! 计费账本
//!
//! 扣费与退款都在单个事务内同时更新令牌与用户两行，
//! 条件谓词保证余额不会被扣成负数。

use capgate_entity::{token, user};
use sea_orm::sea_query::Expr;
use sea_orm::{ColumnTrait, ConnectionTrait, DatabaseConnection, DbErr, EntityTrait, QueryFilter, TransactionTrait};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum BillingError {
    #[error("insufficient token balance")]
    InsufficientTokenBalance,
    #[error("insufficient user balance")]
    InsufficientUserBalance,
    #[error(transparent)]
    Db(#[from] DbErr),
}

/// 扣费：令牌余额减、已用额度加，用户余额减
///
/// 任一行受条件谓词拦截（余额不足）时整体回滚
pub async fn deduct(db: &DatabaseConnection, token_id: i32, user_id: i32, amount: f64) -> Result<(), BillingError> {
    if amount <= 0.0 {
        return Ok(());
    }

    let txn = db.begin().await?;

    let result = token::Entity::update_many()
        .col_expr(token::Column::Balance, Expr::col(token::Column::Balance).sub(amount))
        .col_expr(token::Column::TotalUsed, Expr::col(token::Column::TotalUsed).add(amount))
        .filter(token::Column::Id.eq(token_id))
        .filter(token::Column::Balance.gte(amount))
        .exec(&txn)
        .await?;
    if result.rows_affected == 0 {
        txn.rollback().await?;
        return Err(BillingError::InsufficientTokenBalance);
    }

    if user_id > 0 {
        let result = user::Entity::update_many()
            .col_expr(user::Column::Balance, Expr::col(user::Column::Balance).sub(amount))
            .filter(user::Column::Id.eq(user_id))
            .filter(user::Column::Balance.gte(amount))
            .exec(&txn)
            .await?;
        if result.rows_affected == 0 {
            txn.rollback().await?;
            return Err(BillingError::InsufficientUserBalance);
        }
    }

    txn.commit().await?;
    debug!("扣费成功: token={} user={} amount={}", token_id, user_id, amount);
    Ok(())
}

/// 退款：无条件对称加回，令牌已用额度同步回退
///
/// 接受事务连接，调用方负责把退款与任务终态更新放进同一事务
pub async fn refund<C: ConnectionTrait>(conn: &C, token_id: i32, user_id: i32, amount: f64) -> Result<(), DbErr> {
    if amount <= 0.0 {
        return Ok(());
    }

    token::Entity::update_many()
        .col_expr(token::Column::Balance, Expr::col(token::Column::Balance).add(amount))
        .col_expr(token::Column::TotalUsed, Expr::col(token::Column::TotalUsed).sub(amount))
        .filter(token::Column::Id.eq(token_id))
        .exec(conn)
        .await?;

    if user_id > 0 {
        user::Entity::update_many()
            .col_expr(user::Column::Balance, Expr::col(user::Column::Balance).add(amount))
            .filter(user::Column::Id.eq(user_id))
            .exec(conn)
            .await?;
    }

    debug!("退款成功: token={} user={} amount={}", token_id, user_id, amount);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use capgate_migration::{Migrator, MigratorTrait};
    use chrono::Utc;
    use sea_orm::{ActiveModelTrait, ConnectOptions, Database, Set};

    async fn setup() -> DatabaseConnection {
        // 内存库必须单连接，连接池里每个连接都是独立的内存数据库
        let mut option = ConnectOptions::new("sqlite::memory:");
        option.max_connections(1);
        let db = Database::connect(option).await.unwrap();
        Migrator::up(&db, None).await.unwrap();

        let now = Utc::now().naive_utc();
        user::ActiveModel {
            username: Set("alice".into()),
            password: Set("x".into()),
            role: Set(user::UserRole::User),
            balance: Set(10.0),
            status: Set(1),
            created_at: Set(now),
            updated_at: Set(now),
            ..Default::default()
        }
        .insert(&db)
        .await
        .unwrap();

        token::ActiveModel {
            user_id: Set(1),
            key: Set("sk-test".into()),
            name: Set("t".into()),
            balance: Set(5.0),
            total_used: Set(0.0),
            rate_limit: Set(60),
            status: Set(1),
            created_at: Set(now),
            updated_at: Set(now),
            ..Default::default()
        }
        .insert(&db)
        .await
        .unwrap();

        db
    }

    async fn balances(db: &DatabaseConnection) -> (f64, f64, f64) {
        let t = token::Entity::find_by_id(1).one(db).await.unwrap().unwrap();
        let u = user::Entity::find_by_id(1).one(db).await.unwrap().unwrap();
        (t.balance, t.total_used, u.balance)
    }

    #[tokio::test]
    async fn test_deduct_and_refund_roundtrip() {
        let db = setup().await;

        deduct(&db, 1, 1, 2.0).await.unwrap();
        assert_eq!(balances(&db).await, (3.0, 2.0, 8.0));

        refund(&db, 1, 1, 2.0).await.unwrap();
        assert_eq!(balances(&db).await, (5.0, 0.0, 10.0));
    }

    #[tokio::test]
    async fn test_deduct_insufficient_token_balance() {
        let db = setup().await;

        let err = deduct(&db, 1, 1, 6.0).await.unwrap_err();
        assert!(matches!(err, BillingError::InsufficientTokenBalance));
        // 整体回滚，两行都不动
        assert_eq!(balances(&db).await, (5.0, 0.0, 10.0));
    }

    #[tokio::test]
    async fn test_deduct_insufficient_user_balance_rolls_back_token() {
        let db = setup().await;

        // 用户余额压到 1，令牌余额够而用户不够
        user::Entity::update_many()
            .col_expr(user::Column::Balance, Expr::value(1.0))
            .filter(user::Column::Id.eq(1))
            .exec(&db)
            .await
            .unwrap();

        let err = deduct(&db, 1, 1, 2.0).await.unwrap_err();
        assert!(matches!(err, BillingError::InsufficientUserBalance));
        let (token_balance, total_used, _) = balances(&db).await;
        assert_eq!((token_balance, total_used), (5.0, 0.0));
    }

    #[tokio::test]
    async fn test_zero_amount_is_noop() {
        let db = setup().await;
        deduct(&db, 1, 1, 0.0).await.unwrap();
        refund(&db, 1, 1, -1.0).await.unwrap();
        assert_eq!(balances(&db).await, (5.0, 0.0, 10.0));
    }
}
