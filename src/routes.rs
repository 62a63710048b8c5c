use crate::{
    api::{attendance, employee, export},
    config::Config,
};
use actix_web::web;

pub fn configure(cfg: &mut web::ServiceConfig, config: &Config) {
    cfg.service(
        web::scope(&config.api_prefix)
            .service(
                web::resource("/employees")
                    .route(web::post().to(employee::create_employee))
                    .route(web::get().to(employee::list_employees)),
            )
            .service(
                web::resource("/employees/{employee_id}")
                    .route(web::get().to(employee::get_employee))
                    .route(web::put().to(employee::update_employee)),
            )
            .service(
                web::scope("/attendance")
                    .service(
                        web::resource("/edits")
                            .route(web::put().to(attendance::stage_edit))
                            .route(web::get().to(attendance::list_staged))
                            .route(web::delete().to(attendance::discard_staged)),
                    )
                    .route("/save", web::post().to(attendance::save))
                    .route("/import", web::post().to(attendance::import_entries))
                    // Must precede the grid route, which has the same segment count.
                    .route(
                        "/{employee_id}/{date}/restore",
                        web::post().to(attendance::restore_day),
                    )
                    .route(
                        "/{employee_id}/{year}/{month}",
                        web::get().to(attendance::get_monthly_grid),
                    ),
            )
            .route("/export", web::get().to(export::export_workbook))
            .route("/leave-types", web::get().to(attendance::leave_types)),
    );
}
