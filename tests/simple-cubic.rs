/* ********************************************************************** **
**  This file is part of fcfit.                                           **
**                                                                        **
**  fcfit is free software: you can redistribute it and/or modify it     **
**  under the terms of the GNU General Public License as published by    **
**  the Free Software Foundation, either version 3 of the License, or    **
**  (at your option) any later version.                                   **
**                                                                        **
**      http://www.gnu.org/licenses/                                      **
**                                                                        **
** Do note that, while the whole of fcfit is licensed under the GPL, many **
** parts of it are licensed under more permissive terms.                  **
** ********************************************************************** */

#[macro_use] extern crate fcfit_assert_close;
extern crate fcfit;
extern crate rand;
extern crate serde_json;

mod shared;

use fcfit::{FitSession, Native, Settings};
use fcfit::fcs::build_tables;
use fcfit::Basis;
use fcfit::logging::GlobalLogger;

#[test]
fn onsite_term_has_one_parameter() {
    let symmetry = shared::simple_cubic();
    let clusters = shared::harmonic_clusters(&[0], &[]);

    let tables = build_tables(&clusters, &symmetry, Basis::Cartesian, true);
    assert_eq!(tables.len(), 1);
    assert_eq!(tables[0].num_mothers(), 1);
    assert_eq!(tables[0].nequiv(), &[3]);
    assert_eq!(tables[0].zeros().len(), 6);
    assert!(tables[0].zeros().iter().all(|p| p.is_zero()));

    let tables = build_tables(&clusters, &symmetry, Basis::Cartesian, false);
    assert!(tables[0].zeros().is_empty());
}

#[test]
fn svd_recovers_spring_constant() {
    let symmetry = shared::simple_cubic();
    let clusters = shared::harmonic_clusters(&[0], &[]);
    let k = 4.7;
    let data = shared::harmonic_dataset(
        shared::random_displacements(4, 1),
        |e, f| if e == f { k } else { 0.0 },
    );

    // the only test in this binary that installs a logger
    let log = ::std::env::temp_dir().join("fcfit-simple-cubic.log");
    GlobalLogger::default().path(&log).verbosity(1).apply().unwrap();

    let mut session = FitSession::new(&Settings::default(), &symmetry, &clusters, Native).unwrap();
    let result = session.fit(&data, None).unwrap();
    assert!(::std::fs::metadata(&log).unwrap().len() > 0);

    assert_close!(rel=1e-6, result.params[0][0], k);
    let report = result.report.unwrap();
    assert_eq!(report.rank, 1);
    assert!(report.fitting_error_percent < 1e-8);

    for fc in &result.force_constants[0] {
        assert_eq!(fc.elems[0], fc.elems[1]);
        assert_close!(rel=1e-6, fc.value, k);
    }
}

#[test]
fn result_serializes() {
    let symmetry = shared::simple_cubic();
    let clusters = shared::harmonic_clusters(&[0], &[]);
    let data = shared::harmonic_dataset(
        shared::random_displacements(2, 1),
        |e, f| if e == f { 1.0 } else { 0.0 },
    );

    let mut session = FitSession::new(&Settings::default(), &symmetry, &clusters, Native).unwrap();
    let result = session.fit(&data, None).unwrap();

    let json = ::serde_json::to_value(&result).unwrap();
    assert_eq!(json["solver"], "svd");
    assert_eq!(json["params"][0].as_array().unwrap().len(), 1);
    assert_eq!(json["force-constants"][0].as_array().unwrap().len(), 3);
    assert!(json["lasso"].is_null());

    let table = ::serde_json::to_value(&session.tables()[0]).unwrap();
    assert_eq!(table["nequiv"], ::serde_json::json!([3]));
}
